//! A reference GAPI (§1's "two reference resource kinds used by the test suite and
//! examples", extended here to a matching reference frontend): builds one fixed resource
//! graph from a serializable [`StaticSpec`], ticks exactly once, then its `next()` stream
//! ends. Used by the empty-deploy bootstrap (§4.8) and by `mgmt-deploy`/`mgmt-engine`
//! integration tests that need a `Gapi` without writing a bespoke frontend.

use std::sync::Arc;

use async_trait::async_trait;
use mgmt_resource::{NoopResource, RecvSource, TestResource, Uid, UidPattern};
use mgmt_rgraph::{Edge, ResourceGraph};
use mgmt_world::World;
use serde_derive::{Deserialize, Serialize};

use crate::gapi::{Gapi, GapiError, GettableGapi, NextEvent};

/// A serializable mirror of the handful of [`mgmt_resource::Value`] shapes the reference
/// resources need; not a general value encoder (that's out of scope for a test frontend).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WireValue {
    Unit,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl WireValue {
    fn into_value(self) -> mgmt_resource::Value {
        match self {
            WireValue::Unit => mgmt_resource::Value::Unit,
            WireValue::Bool(b) => mgmt_resource::Value::Bool(b),
            WireValue::Int(i) => mgmt_resource::Value::Int(i),
            WireValue::Str(s) => mgmt_resource::Value::Str(s),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ResourceSpec {
    Noop {
        name: String,
        payload: String,
        provides: Vec<(String, String)>,
        requires: Vec<(String, String)>,
        reversible: bool,
    },
    Test {
        name: String,
        payload: String,
        sends: Option<WireValue>,
        recv_from: Option<(String, String, String)>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from_kind: String,
    pub from_name: String,
    pub to_kind: String,
    pub to_name: String,
    pub notify: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StaticSpec {
    pub resources: Vec<ResourceSpec>,
    pub edges: Vec<EdgeSpec>,
}

pub struct StaticGapi {
    spec: StaticSpec,
    ticked: bool,
}

impl StaticGapi {
    pub fn new(spec: StaticSpec) -> Self {
        StaticGapi { spec, ticked: false }
    }
}

fn build_graph(spec: &StaticSpec) -> Result<ResourceGraph, GapiError> {
    let mut graph = ResourceGraph::new();
    for resource in &spec.resources {
        let boxed: Box<dyn mgmt_resource::Resource> = match resource {
            ResourceSpec::Noop {
                name,
                payload,
                provides,
                requires,
                reversible,
            } => {
                let mut r = NoopResource::new(name.clone())
                    .with_payload(payload.clone())
                    .with_provides(
                        provides
                            .iter()
                            .map(|(kind, name)| Uid {
                                kind: kind.clone(),
                                name: name.clone(),
                            })
                            .collect(),
                    )
                    .with_requires(
                        requires
                            .iter()
                            .map(|(kind, name_glob)| UidPattern {
                                kind: kind.clone(),
                                name_glob: name_glob.clone(),
                            })
                            .collect(),
                    );
                if *reversible {
                    r = r.reversible();
                }
                Box::new(r)
            }
            ResourceSpec::Test {
                name,
                payload,
                sends,
                recv_from,
            } => {
                let mut r = TestResource::new(name.clone()).with_payload(payload.clone());
                if let Some(value) = sends.clone() {
                    r = r.sending(value.into_value());
                }
                if let Some((source_kind, source_name, source_field)) = recv_from.clone() {
                    r = r.receiving_from(RecvSource {
                        source_kind,
                        source_name,
                        source_field,
                    });
                }
                Box::new(r)
            }
        };
        graph
            .add_resource(boxed)
            .map_err(|e| GapiError::Graph("static".to_string(), e.to_string()))?;
    }
    for edge in &spec.edges {
        let from = graph
            .find(&mgmt_rgraph::ResourceId {
                kind: edge.from_kind.clone(),
                name: edge.from_name.clone(),
            })
            .ok_or_else(|| {
                GapiError::Graph(
                    "static".to_string(),
                    format!("edge source not found: {}[{}]", edge.from_kind, edge.from_name),
                )
            })?;
        let to = graph
            .find(&mgmt_rgraph::ResourceId {
                kind: edge.to_kind.clone(),
                name: edge.to_name.clone(),
            })
            .ok_or_else(|| {
                GapiError::Graph(
                    "static".to_string(),
                    format!("edge destination not found: {}[{}]", edge.to_kind, edge.to_name),
                )
            })?;
        let mut e = Edge::new(format!("{}->{}", edge.from_name, edge.to_name));
        if edge.notify {
            e = e.notify();
        }
        graph.add_edge(from, to, e);
    }
    Ok(graph)
}

#[async_trait]
impl Gapi for StaticGapi {
    fn name(&self) -> &str {
        "static"
    }

    async fn init(&mut self, _world: Arc<dyn World>) -> Result<(), GapiError> {
        Ok(())
    }

    async fn graph(&self) -> Result<ResourceGraph, GapiError> {
        build_graph(&self.spec)
    }

    async fn next(&mut self) -> Option<NextEvent> {
        if self.ticked {
            return None;
        }
        self.ticked = true;
        Some(NextEvent::default())
    }
}

pub struct StaticGapiFactory;

impl GettableGapi for StaticGapiFactory {
    fn name(&self) -> &str {
        "static"
    }

    fn build(&self, payload: &[u8]) -> Result<Box<dyn Gapi>, GapiError> {
        let spec: StaticSpec =
            bincode::deserialize(payload).map_err(|e| GapiError::Decode("static".to_string(), e.to_string()))?;
        Ok(Box::new(StaticGapi::new(spec)))
    }
}
