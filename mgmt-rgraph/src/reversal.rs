//! Reversals (§4.3): when a deploy drops a resource that opted into [`Resource::reversal`],
//! the synthesized "undo" resource gets injected into the synced graph so it runs exactly
//! once, and a durable marker survives a crash between the drop and the undo's apply.

use std::sync::Arc;

use mgmt_world::{Kv, WorldError};

use crate::graph::ResourceGraph;
use crate::vertex::ResourceId;

const KEY_PREFIX: &str = "mgmt/reversal/";

fn key_for(id: &ResourceId) -> String {
    format!("{KEY_PREFIX}{}/{}", id.kind, id.name)
}

/// Inverse of [`key_for`]; assumes `kind` never contains a `/`, which holds for every
/// resource kind in this workspace.
fn id_for_key(key: &str) -> Option<ResourceId> {
    let rest = key.strip_prefix(KEY_PREFIX)?;
    let (kind, name) = rest.split_once('/')?;
    Some(ResourceId {
        kind: kind.to_string(),
        name: name.to_string(),
    })
}

/// Backed by a [`Kv`] handle so a pending reversal survives a process restart between
/// the resource's removal and its undo's successful `CheckApply` (§7's crash-recovery
/// concerns, carried from the Deploy Bus's own durability story).
pub struct ReversalTable {
    kv: Arc<dyn Kv>,
}

impl ReversalTable {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        ReversalTable { kv }
    }

    /// Marks `id`'s reversal as pending. Idempotent: recording twice just overwrites.
    pub async fn record_pending(&self, id: &ResourceId) -> Result<(), WorldError> {
        self.kv.put(&key_for(id), b"pending".to_vec(), None).await
    }

    /// Clears the marker once the undo resource's `CheckApply` has succeeded.
    pub async fn clear_pending(&self, id: &ResourceId) -> Result<(), WorldError> {
        self.kv.delete(&key_for(id)).await
    }

    /// True if `id` has a reversal recorded but not yet cleared — used at startup to
    /// decide whether an undo needs re-running even if the current graph no longer
    /// references the resource at all.
    pub async fn is_pending(&self, id: &ResourceId) -> Result<bool, WorldError> {
        Ok(self.kv.get(&key_for(id)).await?.is_some())
    }

    /// Every reversal marker still outstanding, e.g. because the process stopped between
    /// a resource's removal and its undo's successful `CheckApply`. Used at startup to
    /// surface reversals that never finished — the concrete undo resource instance is
    /// never persisted, only its id, so a stale marker can be reported but not replayed
    /// automatically across a crash boundary.
    pub async fn list_pending(&self) -> Result<Vec<ResourceId>, WorldError> {
        Ok(self
            .kv
            .list_prefix(KEY_PREFIX)
            .await?
            .into_iter()
            .filter_map(|(key, _)| id_for_key(&key))
            .collect())
    }
}

/// For every id in `removed` that has a reversal, synthesizes the undo resource from the
/// still-live `old` vertex and adds it to `synced` as an unconnected vertex (the engine
/// schedules it like any other newly-added vertex; it carries no edges because the thing
/// it is undoing already left the graph). Returns the ids actually injected, which the
/// caller should pass to [`ReversalTable::record_pending`] before releasing the pause.
pub async fn inject_reversals(
    old: &ResourceGraph,
    synced: &mut ResourceGraph,
    removed: &[ResourceId],
) -> Vec<ResourceId> {
    let mut injected = Vec::new();
    for id in removed {
        let Some(old_id) = old.find(id) else { continue };
        let old_vertex = old.vertex(old_id).expect("find() returned a live id");
        let reversal = {
            let guard = old_vertex.resource.lock().await;
            guard.reversal()
        };
        if let Some(undo) = reversal {
            let undo_id = ResourceId {
                kind: undo.kind().to_string(),
                name: undo.name().to_string(),
            };
            if synced.add_resource(undo).is_ok() {
                injected.push(undo_id);
            }
        }
    }
    injected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NoopResource;
    use async_trait::async_trait;
    use mgmt_resource::{CmpMismatch, InitArgs, MetaParams, Resource, ResourceError, WatchEvent, WatchSender};
    use mgmt_world::MemoryKv;

    #[derive(Debug, Clone)]
    struct ReversibleResource {
        name: String,
        meta: MetaParams,
    }

    #[async_trait]
    impl Resource for ReversibleResource {
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
        fn reversal(&self) -> Option<Box<dyn Resource>> {
            Some(Box::new(NoopResource::new(format!("undo-{}", self.name))))
        }
    }

    #[tokio::test]
    async fn injects_reversal_for_removed_resource() {
        let mut old = ResourceGraph::new();
        old.add_resource(Box::new(ReversibleResource {
            name: "etc-hosts".into(),
            meta: MetaParams::default(),
        }))
        .unwrap();
        let removed = vec![ResourceId {
            kind: "file".into(),
            name: "etc-hosts".into(),
        }];

        let mut synced = ResourceGraph::new();
        let injected = inject_reversals(&old, &mut synced, &removed).await;

        assert_eq!(injected.len(), 1);
        assert_eq!(synced.len(), 1);
        assert!(synced
            .find(&ResourceId {
                kind: "noop".into(),
                name: "undo-etc-hosts".into(),
            })
            .is_some());
    }

    #[tokio::test]
    async fn skips_resources_with_no_reversal() {
        let mut old = ResourceGraph::new();
        old.add_resource(Box::new(NoopResource::new("a"))).unwrap();
        let removed = vec![ResourceId {
            kind: "noop".into(),
            name: "a".into(),
        }];

        let mut synced = ResourceGraph::new();
        let injected = inject_reversals(&old, &mut synced, &removed).await;
        assert!(injected.is_empty());
        assert!(synced.is_empty());
    }

    #[tokio::test]
    async fn table_round_trips_pending_state() {
        let kv = MemoryKv::new();
        let table = ReversalTable::new(kv);
        let id = ResourceId {
            kind: "file".into(),
            name: "etc-hosts".into(),
        };
        assert!(!table.is_pending(&id).await.unwrap());
        table.record_pending(&id).await.unwrap();
        assert!(table.is_pending(&id).await.unwrap());
        table.clear_pending(&id).await.unwrap();
        assert!(!table.is_pending(&id).await.unwrap());
    }

    #[tokio::test]
    async fn list_pending_reports_uncleared_markers() {
        let kv = MemoryKv::new();
        let table = ReversalTable::new(kv);
        let a = ResourceId {
            kind: "file".into(),
            name: "etc-hosts".into(),
        };
        let b = ResourceId {
            kind: "noop".into(),
            name: "undo-a".into(),
        };
        table.record_pending(&a).await.unwrap();
        table.record_pending(&b).await.unwrap();
        table.clear_pending(&a).await.unwrap();

        let pending = table.list_pending().await.unwrap();
        assert_eq!(pending, vec![b]);
    }
}
