//! Special "world" functions (§4.5): `getval` subscribes to a cluster KV key, `schedule`
//! leases hostnames from the cluster scheduler. Both are `Memo`-class — their output
//! depends on external state, not solely on their declared arguments, so the unifier and
//! the scheduler must never speculatively re-run them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mgmt_resource::{Value, ValueType};
use mgmt_world::{SchedulerOpts, WatchEvent, World};
use tokio_util::sync::CancellationToken;

use crate::function::{emit_if_changed, ArgStream, Function, FuncClass, FuncError, Info, OutSink, Signature};

fn struct_value(fields: Vec<(&str, Value)>) -> Value {
    Value::Map(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// `getval(key)`: emits `{value, exists}` whenever the world KV's value for `key` changes.
#[derive(Debug)]
pub struct GetVal {
    world: Arc<dyn World>,
    key: String,
}

impl GetVal {
    pub fn new(world: Arc<dyn World>, key: impl Into<String>) -> Self {
        GetVal {
            world,
            key: key.into(),
        }
    }
}

#[async_trait]
impl Function for GetVal {
    fn info(&self) -> Info {
        Info {
            class: FuncClass::Memo,
            signature: Signature {
                args: vec![],
                ret: ValueType::Map,
            },
        }
    }

    async fn stream(
        &mut self,
        _args: BTreeMap<String, ArgStream>,
        out: OutSink,
        cancel: CancellationToken,
    ) -> Result<(), FuncError> {
        let initial = self
            .world
            .kv()
            .get(&self.key)
            .await
            .map_err(|e| FuncError::Stream(e.to_string()))?;
        emit(&out, initial);

        let mut watch = self.world.kv().watch(&self.key);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = watch.recv() => {
                    match event {
                        Ok(WatchEvent::Put { key, value, .. }) if key == self.key => {
                            emit(&out, Some(value));
                        }
                        Ok(WatchEvent::Delete { key, .. }) if key == self.key => {
                            emit(&out, None);
                        }
                        Ok(_) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                    }
                }
            }
        }
    }
}

fn emit(out: &OutSink, raw: Option<Vec<u8>>) {
    let value = match raw {
        Some(bytes) => struct_value(vec![
            ("value", Value::Str(String::from_utf8_lossy(&bytes).into_owned())),
            ("exists", Value::Bool(true)),
        ]),
        None => struct_value(vec![("value", Value::Str(String::new())), ("exists", Value::Bool(false))]),
    };
    emit_if_changed(out, value);
}

/// `schedule(namespace, opts)`: leases `opts.count` hostnames from the cluster scheduler
/// and emits the current roster as a `List` of `Str`s whenever it changes. The reference
/// scheduler (`mgmt_world::world::RoundRobinScheduler`) returns a stable roster per call,
/// so this polls rather than subscribing to a push channel — real cluster schedulers
/// would instead drive this from their own watch, which is why this lives behind the
/// `World` trait rather than being hardcoded here.
#[derive(Debug)]
pub struct Schedule {
    world: Arc<dyn World>,
    namespace: String,
    opts: SchedulerOpts,
    poll_interval: Duration,
}

impl Schedule {
    pub fn new(world: Arc<dyn World>, namespace: impl Into<String>, opts: SchedulerOpts) -> Self {
        Schedule {
            world,
            namespace: namespace.into(),
            opts,
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl Function for Schedule {
    fn info(&self) -> Info {
        Info {
            class: FuncClass::Memo,
            signature: Signature {
                args: vec![],
                ret: ValueType::List,
            },
        }
    }

    async fn stream(
        &mut self,
        _args: BTreeMap<String, ArgStream>,
        out: OutSink,
        cancel: CancellationToken,
    ) -> Result<(), FuncError> {
        loop {
            let hosts = self
                .world
                .scheduler()
                .schedule(&self.namespace, self.opts.clone())
                .await
                .map_err(|e| FuncError::Stream(e.to_string()))?;
            emit_if_changed(&out, Value::List(hosts.into_iter().map(Value::Str).collect()));

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
