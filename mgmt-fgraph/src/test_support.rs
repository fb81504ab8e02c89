//! Minimal function kinds for this crate's own unit tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use mgmt_resource::{Value, ValueType};
use tokio_util::sync::CancellationToken;

use crate::function::{emit_if_changed, ArgStream, Function, FuncClass, FuncError, Info, OutSink, Signature};

/// A source vertex: no inputs, emits one fixed value then idles until cancelled.
#[derive(Debug, Clone)]
pub struct ConstFunc {
    value: Value,
}

impl ConstFunc {
    pub fn new_source(value: Value) -> Self {
        ConstFunc { value }
    }
}

#[async_trait]
impl Function for ConstFunc {
    fn info(&self) -> Info {
        Info {
            class: FuncClass::Pure,
            signature: Signature {
                args: vec![],
                ret: self.value.type_of(),
            },
        }
    }

    async fn stream(
        &mut self,
        _args: BTreeMap<String, ArgStream>,
        out: OutSink,
        cancel: CancellationToken,
    ) -> Result<(), FuncError> {
        emit_if_changed(&out, self.value.clone());
        cancel.cancelled().await;
        Ok(())
    }
}

/// A one-argument passthrough, used to exercise wiring and dedup.
#[derive(Debug, Clone)]
pub struct IdentityFunc {
    arg_type: ValueType,
}

impl IdentityFunc {
    pub fn new(arg_type: ValueType) -> Self {
        IdentityFunc { arg_type }
    }
}

#[async_trait]
impl Function for IdentityFunc {
    fn info(&self) -> Info {
        Info {
            class: FuncClass::Pure,
            signature: Signature {
                args: vec![("x".to_string(), self.arg_type)],
                ret: self.arg_type,
            },
        }
    }

    async fn stream(
        &mut self,
        mut args: BTreeMap<String, ArgStream>,
        out: OutSink,
        cancel: CancellationToken,
    ) -> Result<(), FuncError> {
        let mut x = args.remove("x").ok_or_else(|| FuncError::Stream("missing arg x".into()))?;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                changed = x.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    if let Some(value) = x.borrow().clone() {
                        emit_if_changed(&out, value);
                    }
                }
            }
        }
    }
}
