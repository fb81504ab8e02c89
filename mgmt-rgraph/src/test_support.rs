//! Minimal resource kinds used only by this crate's own unit tests, kept in their own
//! module the way a workspace's other `testutil` crates keep graph/rule-graph fixtures
//! out of the main source tree.

use std::collections::BTreeMap;

use async_trait::async_trait;
use mgmt_resource::{
    CmpMismatch, Groupable, InitArgs, MetaParams, RecvSource, Recvable, Resource, ResourceError,
    Sendable, Value, ValueType, WatchEvent, WatchSender,
};

#[derive(Debug, Clone)]
pub struct NoopResource {
    pub name: String,
    pub config: i64,
    pub meta: MetaParams,
}

impl NoopResource {
    pub fn new(name: impl Into<String>) -> Self {
        NoopResource {
            name: name.into(),
            config: 0,
            meta: MetaParams::default(),
        }
    }

    pub fn with_config(name: impl Into<String>, config: i64) -> Self {
        NoopResource {
            name: name.into(),
            config,
            meta: MetaParams::default(),
        }
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
        let other_config = other.as_any().downcast_ref::<NoopResource>().map(|o| o.config);
        match other_config {
            Some(c) if c == self.config => Ok(()),
            Some(c) => Err(CmpMismatch::Config(format!("{} != {}", self.config, c))),
            None => Ok(()),
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
}

#[derive(Debug, Clone)]
pub struct SendResource {
    pub name: String,
    pub meta: MetaParams,
    pub fields: BTreeMap<String, Value>,
}

impl SendResource {
    pub fn new(name: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        SendResource {
            name: name.into(),
            meta: MetaParams::default(),
            fields,
        }
    }
}

#[async_trait]
impl Resource for SendResource {
    fn kind(&self) -> &str {
        "exec"
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
    fn cmp_config(&self, _other: &dyn Resource) -> Result<(), CmpMismatch> {
        Ok(())
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
}

impl Sendable for SendResource {
    fn send_fields(&self) -> BTreeMap<String, Value> {
        self.fields.clone()
    }
}

#[derive(Debug, Clone)]
pub struct RecvResource {
    pub name: String,
    pub meta: MetaParams,
    pub recv: BTreeMap<String, RecvSource>,
    pub received: BTreeMap<String, Value>,
    pub recv_types: BTreeMap<String, ValueType>,
}

impl RecvResource {
    pub fn new(name: impl Into<String>, recv: BTreeMap<String, RecvSource>) -> Self {
        RecvResource {
            name: name.into(),
            meta: MetaParams::default(),
            recv,
            received: BTreeMap::new(),
            recv_types: BTreeMap::new(),
        }
    }

    pub fn expect_type(mut self, field: &str, ty: ValueType) -> Self {
        self.recv_types.insert(field.to_string(), ty);
        self
    }
}

#[async_trait]
impl Resource for RecvResource {
    fn kind(&self) -> &str {
        "file"
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
    fn cmp_config(&self, _other: &dyn Resource) -> Result<(), CmpMismatch> {
        Ok(())
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
}

impl Recvable for RecvResource {
    fn recv_fields(&self) -> BTreeMap<String, RecvSource> {
        self.recv.clone()
    }
    fn recv_field_type(&self, field: &str) -> Option<ValueType> {
        self.recv_types.get(field).copied()
    }
    fn set_recv(&mut self, field: &str, value: Value) -> Result<(), ResourceError> {
        self.received.insert(field.to_string(), value);
        Ok(())
    }
    fn get_recv(&self, field: &str) -> Option<Value> {
        self.received.get(field).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct GroupResource {
    pub name: String,
    pub meta: MetaParams,
    pub key: Option<String>,
    pub merged: Vec<String>,
}

impl GroupResource {
    pub fn new(name: impl Into<String>, key: Option<&str>) -> Self {
        GroupResource {
            name: name.into(),
            meta: MetaParams::default(),
            key: key.map(|s| s.to_string()),
            merged: Vec::new(),
        }
    }
}

#[async_trait]
impl Resource for GroupResource {
    fn kind(&self) -> &str {
        "pkg"
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
    fn cmp_config(&self, _other: &dyn Resource) -> Result<(), CmpMismatch> {
        Ok(())
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
    fn as_groupable(&self) -> Option<&dyn Groupable> {
        Some(self)
    }
    fn as_groupable_mut(&mut self) -> Option<&mut dyn Groupable> {
        Some(self)
    }
}

impl Groupable for GroupResource {
    fn group_key(&self) -> Option<String> {
        self.key.clone()
    }
    fn merge(&mut self, other: Box<dyn Resource>) -> Result<(), ResourceError> {
        self.merged.push(other.name().to_string());
        Ok(())
    }
}
