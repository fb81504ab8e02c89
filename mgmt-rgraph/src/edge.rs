//! The resource graph's edge payload (§3): a name, a `Notify` flag, and an optional
//! Send→Recv field mapping.

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SendRecvMapping {
    pub send_field: String,
    pub recv_field: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    pub name: String,
    pub notify: bool,
    pub send_recv: Option<SendRecvMapping>,
}

impl Edge {
    pub fn new(name: impl Into<String>) -> Self {
        Edge {
            name: name.into(),
            notify: false,
            send_recv: None,
        }
    }

    pub fn notify(mut self) -> Self {
        self.notify = true;
        self
    }

    pub fn with_send_recv(mut self, send_field: impl Into<String>, recv_field: impl Into<String>) -> Self {
        self.send_recv = Some(SendRecvMapping {
            send_field: send_field.into(),
            recv_field: recv_field.into(),
        });
        self
    }
}
