//! Autoedge (§4.3): implicit dependency edges synthesized from kind-declared UIDs.
//! Deliberately does not assume any fixed schema of kinds or UID shapes (§9's open
//! question) — it only matches whatever [`Uid`]/[`UidPattern`] values each resource's
//! `provides`/`requires` happen to advertise.

use mgmt_graph::VertexId;
use mgmt_resource::{Uid, UidPattern};

use crate::edge::Edge;
use crate::graph::ResourceGraph;

/// Adds one edge per satisfied (provider, requirement) pair that isn't already implied
/// by an existing path, skipping any that would introduce a cycle. Returns the number of
/// edges added.
pub async fn autoedge(graph: &mut ResourceGraph) -> usize {
    let ids: Vec<VertexId> = graph.vertices().map(|(id, _)| id).collect();

    let mut provides: Vec<(VertexId, Vec<Uid>)> = Vec::with_capacity(ids.len());
    let mut requires: Vec<(VertexId, Vec<UidPattern>)> = Vec::with_capacity(ids.len());
    for id in &ids {
        let vertex = graph.vertex(*id).expect("id came from vertices()");
        let resource = vertex.resource.lock().await;
        provides.push((*id, resource.provides()));
        requires.push((*id, resource.requires()));
    }

    let mut added = 0;
    for (requirer, patterns) in &requires {
        for pattern in patterns {
            for (provider, uids) in &provides {
                if provider == requirer {
                    continue;
                }
                if !uids.iter().any(|uid| pattern.matches(uid)) {
                    continue;
                }
                if graph.reachable(*provider).contains(requirer) {
                    // A path already exists; the requirement is already honored.
                    continue;
                }
                if graph.would_cycle(*provider, *requirer) {
                    log::warn!(
                        "autoedge: skipping edge that would introduce a cycle ({:?} -> {:?})",
                        provider,
                        requirer
                    );
                    continue;
                }
                graph.add_edge(*provider, *requirer, Edge::new(format!("autoedge:{}", pattern.kind)));
                added += 1;
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mgmt_resource::{CmpMismatch, InitArgs, MetaParams, Resource, ResourceError, WatchEvent, WatchSender};

    #[derive(Debug, Clone)]
    struct UidResource {
        name: String,
        meta: MetaParams,
        provides: Vec<Uid>,
        requires: Vec<UidPattern>,
    }

    #[async_trait]
    impl Resource for UidResource {
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
        fn provides(&self) -> Vec<Uid> {
            self.provides.clone()
        }
        fn requires(&self) -> Vec<UidPattern> {
            self.requires.clone()
        }
    }

    #[tokio::test]
    async fn synthesizes_edge_from_matching_uid() {
        let mut g = ResourceGraph::new();
        g.add_resource(Box::new(UidResource {
            name: "openssl".into(),
            meta: MetaParams::default(),
            provides: vec![Uid {
                kind: "pkg".into(),
                name: "openssl".into(),
            }],
            requires: vec![],
        }))
        .unwrap();
        g.add_resource(Box::new(UidResource {
            name: "nginx".into(),
            meta: MetaParams::default(),
            provides: vec![],
            requires: vec![UidPattern {
                kind: "pkg".into(),
                name_glob: "openssl".into(),
            }],
        }))
        .unwrap();

        let added = autoedge(&mut g).await;
        assert_eq!(added, 1);
        assert_eq!(g.topological_sort().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn skips_edge_that_would_cycle() {
        // `a` and `b` each provide their own uid and require the other's, a contradiction
        // a plain config file could easily express. Only one of the two implied edges can
        // be added without creating a cycle; autoedge must pick one and skip the other
        // rather than leave the graph cyclic.
        let mut g = ResourceGraph::new();
        g.add_resource(Box::new(UidResource {
            name: "a".into(),
            meta: MetaParams::default(),
            provides: vec![Uid {
                kind: "pkg".into(),
                name: "a".into(),
            }],
            requires: vec![UidPattern {
                kind: "pkg".into(),
                name_glob: "b".into(),
            }],
        }))
        .unwrap();
        g.add_resource(Box::new(UidResource {
            name: "b".into(),
            meta: MetaParams::default(),
            provides: vec![Uid {
                kind: "pkg".into(),
                name: "b".into(),
            }],
            requires: vec![UidPattern {
                kind: "pkg".into(),
                name_glob: "a".into(),
            }],
        }))
        .unwrap();

        let added = autoedge(&mut g).await;
        assert_eq!(added, 1);
        assert!(g.topological_sort().is_ok());
    }
}
