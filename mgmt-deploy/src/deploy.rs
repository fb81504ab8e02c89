//! The `Deploy` record (§3): immutable, serialized via `bincode` so a peer without the
//! original source can reconstruct the GAPI by name lookup through `mgmt_gapi::Registry`.

use serde_derive::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub id: u64,
    pub name: String,
    pub noop: bool,
    pub sema: i64,
    pub payload: Vec<u8>,
}

impl Deploy {
    /// The deploy synthesized to bootstrap the engine before any real deploy has landed
    /// (§4.8): id 0, no payload, no registered GAPI name to look up.
    pub fn empty() -> Self {
        Deploy {
            id: 0,
            name: String::new(),
            noop: false,
            sema: 0,
            payload: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id == 0 && self.payload.is_empty() && self.name.is_empty()
    }
}
