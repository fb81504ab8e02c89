//! The two reference resource kinds named in §1 ("no resource implementations beyond the
//! reference noop/test kinds"): [`NoopResource`], a trivial always-correct resource used to
//! exercise the graph-rewrite machinery (autoedge/autogroup/reversals) without a real
//! externality, and [`TestResource`], which additionally implements [`Sendable`]/[`Recvable`]
//! so send/recv wiring can be exercised end to end.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::meta::MetaParams;
use crate::resource::{
    CmpMismatch, InitArgs, RecvSource, Recvable, Resource, ResourceError, Sendable, Uid, UidPattern, WatchEvent, WatchSender,
};
use crate::value::{Value, ValueType};

/// A trivial resource whose `CheckApply` always reports success. `payload` stands in for
/// kind-specific config in `Cmp`; `provides`/`requires` and `reversible` let tests drive
/// autoedge and reversal injection without a real resource kind.
#[derive(Debug, Clone)]
pub struct NoopResource {
    name: String,
    payload: String,
    meta: MetaParams,
    provides: Vec<Uid>,
    requires: Vec<UidPattern>,
    reversible: bool,
}

impl NoopResource {
    pub fn new(name: impl Into<String>) -> Self {
        NoopResource {
            name: name.into(),
            payload: String::new(),
            meta: MetaParams::default(),
            provides: Vec::new(),
            requires: Vec::new(),
            reversible: false,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_provides(mut self, provides: Vec<Uid>) -> Self {
        self.provides = provides;
        self
    }

    pub fn with_requires(mut self, requires: Vec<UidPattern>) -> Self {
        self.requires = requires;
        self
    }

    pub fn reversible(mut self) -> Self {
        self.reversible = true;
        self
    }
}

#[async_trait]
impl Resource for NoopResource {
    fn kind(&self) -> &str {
        "noop"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn meta(&self) -> &MetaParams {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MetaParams {
        &mut self.meta
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn cmp_config(&self, other: &dyn Resource) -> Result<(), CmpMismatch> {
        match other.as_any().downcast_ref::<NoopResource>() {
            Some(other) if other.payload == self.payload => Ok(()),
            Some(other) => Err(CmpMismatch::Config(format!(
                "payload differs: {:?} != {:?}",
                self.payload, other.payload
            ))),
            None => Err(CmpMismatch::Config("not a noop resource".to_string())),
        }
    }

    async fn init(&mut self, _args: &InitArgs) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn watch(&self, _args: &InitArgs, events: WatchSender) -> Result<(), ResourceError> {
        events.send(WatchEvent::Ready).await.ok();
        Ok(())
    }

    async fn check_apply(&mut self, _apply: bool) -> Result<bool, ResourceError> {
        Ok(true)
    }

    fn provides(&self) -> Vec<Uid> {
        self.provides.clone()
    }

    fn requires(&self) -> Vec<UidPattern> {
        self.requires.clone()
    }

    fn reversal(&self) -> Option<Box<dyn Resource>> {
        if self.reversible {
            Some(Box::new(
                NoopResource::new(format!("{}-undo", self.name)).with_payload(format!("undo:{}", self.payload)),
            ))
        } else {
            None
        }
    }
}

/// Like [`NoopResource`] but with one `Sendable` field (`"out"`) and one `Recvable` field
/// (`"in"`), so send/recv wiring (§4.2, §4.4) can be exercised without a real resource kind.
#[derive(Debug, Clone)]
pub struct TestResource {
    name: String,
    payload: String,
    meta: MetaParams,
    out: Value,
    recv_source: Option<RecvSource>,
    recv_value: Option<Value>,
}

impl TestResource {
    pub fn new(name: impl Into<String>) -> Self {
        TestResource {
            name: name.into(),
            payload: String::new(),
            meta: MetaParams::default(),
            out: Value::Unit,
            recv_source: None,
            recv_value: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn sending(mut self, value: Value) -> Self {
        self.out = value;
        self
    }

    pub fn receiving_from(mut self, source: RecvSource) -> Self {
        self.recv_source = Some(source);
        self
    }

    /// The value last delivered via `set_recv`, for assertions in tests.
    pub fn received(&self) -> Option<&Value> {
        self.recv_value.as_ref()
    }
}

#[async_trait]
impl Resource for TestResource {
    fn kind(&self) -> &str {
        "test"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn meta(&self) -> &MetaParams {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MetaParams {
        &mut self.meta
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn cmp_config(&self, other: &dyn Resource) -> Result<(), CmpMismatch> {
        match other.as_any().downcast_ref::<TestResource>() {
            Some(other) if other.payload == self.payload && other.out == self.out => Ok(()),
            Some(_) => Err(CmpMismatch::Config("test resource config differs".to_string())),
            None => Err(CmpMismatch::Config("not a test resource".to_string())),
        }
    }

    async fn init(&mut self, _args: &InitArgs) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn watch(&self, _args: &InitArgs, events: WatchSender) -> Result<(), ResourceError> {
        events.send(WatchEvent::Ready).await.ok();
        Ok(())
    }

    async fn check_apply(&mut self, _apply: bool) -> Result<bool, ResourceError> {
        Ok(true)
    }

    fn as_sendable(&self) -> Option<&dyn Sendable> {
        Some(self)
    }

    fn as_recvable(&self) -> Option<&dyn Recvable> {
        Some(self)
    }

    fn as_recvable_mut(&mut self) -> Option<&mut dyn Recvable> {
        Some(self)
    }
}

impl Sendable for TestResource {
    fn send_fields(&self) -> BTreeMap<String, Value> {
        let mut m = BTreeMap::new();
        m.insert("out".to_string(), self.out.clone());
        m
    }
}

impl Recvable for TestResource {
    fn recv_fields(&self) -> BTreeMap<String, RecvSource> {
        let mut m = BTreeMap::new();
        if let Some(source) = &self.recv_source {
            m.insert("in".to_string(), source.clone());
        }
        m
    }

    fn recv_field_type(&self, field: &str) -> Option<ValueType> {
        match field {
            "in" => Some(self.out.type_of()),
            _ => None,
        }
    }

    fn set_recv(&mut self, field: &str, value: Value) -> Result<(), ResourceError> {
        match field {
            "in" => {
                self.recv_value = Some(value);
                Ok(())
            }
            _ => Err(ResourceError::TypeMismatch {
                field: field.to_string(),
                expected: ValueType::Unit,
                actual: value.type_of(),
            }),
        }
    }

    fn get_recv(&self, field: &str) -> Option<Value> {
        match field {
            "in" => self.recv_value.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_cmp_detects_payload_mismatch() {
        let a = NoopResource::new("a").with_payload("x");
        let b = NoopResource::new("a").with_payload("y");
        assert!(a.cmp(&b).is_err());
    }

    #[test]
    fn noop_reversal_only_when_opted_in() {
        let plain = NoopResource::new("a");
        assert!(plain.reversal().is_none());
        let reversible = NoopResource::new("a").reversible();
        let undo = reversible.reversal().unwrap();
        assert_eq!(undo.name(), "a-undo");
    }

    #[test]
    fn test_resource_round_trips_recv() {
        let mut r = TestResource::new("b");
        assert_eq!(r.received(), None);
        r.set_recv("in", Value::Int(7)).unwrap();
        assert_eq!(r.received(), Some(&Value::Int(7)));
    }

    #[test]
    fn test_resource_sends_out_field() {
        let r = TestResource::new("b").sending(Value::Bool(true));
        assert_eq!(r.send_fields().get("out"), Some(&Value::Bool(true)));
    }
}
