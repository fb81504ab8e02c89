//! GraphSync (§4.2): diffs an old resource graph against a new one, physically reusing
//! old vertex/edge instances wherever they compare equal so running `Watch` coroutines
//! survive a deploy.

use mgmt_graph::VertexId;

use crate::edge::Edge;
use crate::graph::ResourceGraph;
use crate::vertex::ResourceId;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Vertices present in `new` and reused from `old` because `Cmp` matched.
    pub reused: Vec<ResourceId>,
    /// Vertices present in `new` with no equal counterpart in `old`; must be `Init`'d.
    pub added: Vec<ResourceId>,
    /// Vertices present in `old` but absent from `new`; must be `Close`'d after Pause.
    pub removed: Vec<ResourceId>,
}

/// Runs GraphSync(old, new) and returns the synced graph plus a report the engine uses
/// to decide which vertices need `Init`/`Close` (§4.4's Commit).
pub async fn graph_sync(old: &ResourceGraph, new: &ResourceGraph) -> (ResourceGraph, SyncReport) {
    let mut report = SyncReport::default();
    let mut synced = ResourceGraph::new();
    // old_to_synced maps an old VertexId to its (possibly reused) id in `synced`, used to
    // carry edges whose endpoints were both reused.
    let mut new_to_synced: std::collections::HashMap<VertexId, VertexId> =
        std::collections::HashMap::new();

    for (new_id, new_vertex) in new.vertices() {
        let synced_id = match old.find(&new_vertex.id) {
            Some(old_id) => {
                let old_vertex = old.vertex(old_id).expect("find() returned a live id");
                let old_guard = old_vertex.resource.try_lock();
                let new_guard = new_vertex.resource.try_lock();
                let equal = match (old_guard, new_guard) {
                    (Ok(o), Ok(n)) => o.cmp(n.as_ref()).is_ok(),
                    // Commit only runs while the live graph is paused, so contention here
                    // would indicate a bug upstream; treat it conservatively as "changed".
                    _ => false,
                };
                if equal {
                    report.reused.push(new_vertex.id.clone());
                    synced.add_vertex_vertex(old_vertex.clone())
                } else {
                    // Same (kind, name) but `Cmp` disagrees: this is a replacement, not a
                    // fresh addition. Report the old instance as removed too, so the
                    // engine closes it and spawns a new vertex task for the replacement
                    // instead of leaving the stale task running forever.
                    report.added.push(new_vertex.id.clone());
                    report.removed.push(new_vertex.id.clone());
                    synced.add_vertex_vertex(new_vertex.clone())
                }
            }
            None => {
                report.added.push(new_vertex.id.clone());
                synced.add_vertex_vertex(new_vertex.clone())
            }
        };
        new_to_synced.insert(new_id, synced_id);
    }

    for (_eid, from, to, edge) in new.edges() {
        if let (Some(&sfrom), Some(&sto)) = (new_to_synced.get(&from), new_to_synced.get(&to)) {
            let reused_edge = find_equal_old_edge(old, new, from, to, edge);
            synced.add_edge(sfrom, sto, reused_edge.unwrap_or_else(|| edge.clone()));
        }
    }

    for (_id, old_vertex) in old.vertices() {
        if new.find(&old_vertex.id).is_none() {
            report.removed.push(old_vertex.id.clone());
        }
    }

    (synced, report)
}

/// If `old` has an edge between the resources identified the same way as `from`/`to`,
/// with structurally equal data, returns that old edge's data (spec's "reuses the old
/// edge instance"; in Rust, edges are plain data so "instance reuse" only matters insofar
/// as it is observably identical, which this guarantees by construction).
fn find_equal_old_edge(
    old: &ResourceGraph,
    new: &ResourceGraph,
    new_from: VertexId,
    new_to: VertexId,
    new_edge: &Edge,
) -> Option<Edge> {
    let from_id = &new.vertex(new_from)?.id;
    let to_id = &new.vertex(new_to)?.id;
    let old_from = old.find(from_id)?;
    let old_to = old.find(to_id)?;
    old.outgoing_edges(old_from)
        .find(|&(_, target, data)| target == old_to && data == new_edge)
        .map(|(_, _, data)| data.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NoopResource;

    #[tokio::test]
    async fn sync_of_identical_graphs_reuses_everything() {
        let mut old = ResourceGraph::new();
        old.add_resource(Box::new(NoopResource::new("a"))).unwrap();
        let mut new = ResourceGraph::new();
        new.add_resource(Box::new(NoopResource::new("a"))).unwrap();

        let (synced, report) = graph_sync(&old, &new).await;
        assert_eq!(synced.len(), 1);
        assert_eq!(report.reused.len(), 1);
        assert!(report.added.is_empty());
        assert!(report.removed.is_empty());
    }

    #[tokio::test]
    async fn sync_reuses_old_instance_by_identity() {
        let mut old = ResourceGraph::new();
        let old_id = old.add_resource(Box::new(NoopResource::new("a"))).unwrap();
        let old_arc = old.vertex(old_id).unwrap().resource.clone();

        let mut new = ResourceGraph::new();
        new.add_resource(Box::new(NoopResource::new("a"))).unwrap();

        let (synced, _report) = graph_sync(&old, &new).await;
        let synced_id = synced
            .find(&ResourceId {
                kind: "noop".to_string(),
                name: "a".to_string(),
            })
            .unwrap();
        let synced_arc = synced.vertex(synced_id).unwrap().resource.clone();
        assert!(std::sync::Arc::ptr_eq(&old_arc, &synced_arc));
    }

    #[tokio::test]
    async fn sync_detects_added_and_removed() {
        let mut old = ResourceGraph::new();
        old.add_resource(Box::new(NoopResource::new("gone"))).unwrap();
        let mut new = ResourceGraph::new();
        new.add_resource(Box::new(NoopResource::new("fresh"))).unwrap();

        let (synced, report) = graph_sync(&old, &new).await;
        assert_eq!(synced.len(), 1);
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.removed.len(), 1);
    }

    #[tokio::test]
    async fn sync_treats_changed_config_as_replacement() {
        let mut old = ResourceGraph::new();
        old.add_resource(Box::new(NoopResource::with_config("a", 1)))
            .unwrap();
        let mut new = ResourceGraph::new();
        new.add_resource(Box::new(NoopResource::with_config("a", 2)))
            .unwrap();

        let (_synced, report) = graph_sync(&old, &new).await;
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.added[0], report.removed[0]);
        assert!(report.reused.is_empty());
    }
}
