//! Autogroup (§4.3): merges [`Groupable`] vertices of the same kind and group key into a
//! single composite vertex, refusing any merge that would make two previously-unrelated
//! vertices reachable from one another through the merged vertex's unioned edges.
//!
//! Runs once, at Commit time, on a graph that has not yet been handed to GraphSync or
//! had any `Watch` coroutine started against it — so every vertex's `Arc` is held only by
//! the graph itself, which is what lets a merge take the absorbed resource by value.

use std::collections::HashMap;
use std::sync::Arc;

use mgmt_graph::VertexId;
use mgmt_resource::Groupable;

use crate::edge::Edge;
use crate::graph::ResourceGraph;

/// Repeatedly finds a safe mergeable pair and folds it into the graph until no more
/// merges apply. Returns the number of vertices removed by merging.
pub async fn autogroup(graph: &mut ResourceGraph) -> usize {
    let mut removed = 0;
    loop {
        let Some((keep, absorb)) = find_mergeable_pair(graph).await else {
            break;
        };
        if merge_into(graph, keep, absorb).await {
            removed += 1;
        } else {
            // merge_into only declines when the vertex has outstanding references, which
            // shouldn't happen at this point in the pipeline; avoid looping forever on
            // the same unsafe pair.
            break;
        }
    }
    removed
}

#[derive(Hash, Eq, PartialEq, Clone)]
struct GroupBucket {
    kind: String,
    key: String,
}

async fn find_mergeable_pair(graph: &ResourceGraph) -> Option<(VertexId, VertexId)> {
    let mut buckets: HashMap<GroupBucket, Vec<VertexId>> = HashMap::new();
    for (id, vertex) in graph.vertices() {
        let resource = vertex.resource.lock().await;
        if let Some(groupable) = resource.as_groupable() {
            if let Some(key) = groupable.group_key() {
                buckets
                    .entry(GroupBucket {
                        kind: resource.kind().to_string(),
                        key,
                    })
                    .or_default()
                    .push(id);
            }
        }
    }

    for ids in buckets.values() {
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a, b) = (ids[i], ids[j]);
                if is_merge_safe(graph, a, b) {
                    return Some((a, b));
                }
            }
        }
    }
    None
}

/// A merge of `a` and `b` is safe only if every (predecessor, successor) pair implied by
/// unioning their edges was already connected before the merge, i.e. the merge cannot
/// introduce a path between vertices that previously had none.
fn is_merge_safe(graph: &ResourceGraph, a: VertexId, b: VertexId) -> bool {
    let mut predecessors: Vec<VertexId> = graph.incoming(a).chain(graph.incoming(b)).collect();
    predecessors.retain(|&p| p != a && p != b);

    let mut successors: Vec<VertexId> = graph
        .outgoing_edges(a)
        .map(|(_, to, _)| to)
        .chain(graph.outgoing_edges(b).map(|(_, to, _)| to))
        .collect();
    successors.retain(|&s| s != a && s != b);

    for &p in &predecessors {
        let already_reachable = graph.reachable(p);
        for &s in &successors {
            if p == s {
                continue;
            }
            if !already_reachable.contains(&s) {
                return false;
            }
        }
    }
    true
}

/// Absorbs `absorb` into `keep` via [`Groupable::merge`] and rewires every edge that
/// touched `absorb` onto `keep`. Returns `false` without changing the graph if `absorb`'s
/// resource has an outstanding `Arc` clone elsewhere (it shouldn't, at this pipeline
/// stage, but this keeps the function honest rather than panicking).
async fn merge_into(graph: &mut ResourceGraph, keep: VertexId, absorb: VertexId) -> bool {
    let edges_in: Vec<VertexId> = graph.incoming(absorb).filter(|&p| p != keep).collect();
    let edges_out: Vec<(VertexId, Edge)> = graph
        .outgoing_edges(absorb)
        .map(|(_, to, edge)| (to, edge.clone()))
        .filter(|(to, _)| *to != keep)
        .collect();

    let absorb_arc = graph
        .vertex(absorb)
        .expect("absorb id is live")
        .resource
        .clone();
    graph.delete_vertex(absorb).expect("absorb id is live");

    let absorbed = match Arc::try_unwrap(absorb_arc) {
        Ok(mutex) => mutex.into_inner(),
        Err(_) => {
            log::warn!("autogroup: absorbed vertex still referenced elsewhere, skipping merge");
            return false;
        }
    };

    let keep_arc = graph.vertex(keep).expect("keep id is live").resource.clone();
    {
        let mut keep_guard = keep_arc.lock().await;
        if let Some(groupable) = keep_guard.as_groupable_mut() {
            let _ = groupable.merge(absorbed);
        }
    }

    for p in edges_in {
        graph.add_edge(p, keep, Edge::new("autogroup"));
    }
    for (s, edge) in edges_out {
        graph.add_edge(keep, s, edge);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::GroupResource;

    #[tokio::test]
    async fn merges_same_key_vertices() {
        let mut g = ResourceGraph::new();
        g.add_resource(Box::new(GroupResource::new("a", Some("web"))))
            .unwrap();
        g.add_resource(Box::new(GroupResource::new("b", Some("web"))))
            .unwrap();
        g.add_resource(Box::new(GroupResource::new("c", None)))
            .unwrap();

        let removed = autogroup(&mut g).await;
        assert_eq!(removed, 1);
        assert_eq!(g.len(), 2);
    }

    #[tokio::test]
    async fn refuses_merge_that_creates_new_reachability() {
        let mut g = ResourceGraph::new();
        let a = g
            .add_resource(Box::new(GroupResource::new("a", Some("web"))))
            .unwrap();
        let b = g
            .add_resource(Box::new(GroupResource::new("b", Some("web"))))
            .unwrap();
        let x = g
            .add_resource(Box::new(GroupResource::new("x", None)))
            .unwrap();
        let y = g
            .add_resource(Box::new(GroupResource::new("y", None)))
            .unwrap();
        // x -> a, b -> y, but x and y have no path between them yet. Merging a and b
        // would create x -> (a+b) -> y, a brand new x-to-y path, so it must be refused.
        g.add_edge(x, a, Edge::new("e1"));
        g.add_edge(b, y, Edge::new("e2"));

        let removed = autogroup(&mut g).await;
        assert_eq!(removed, 0);
        assert_eq!(g.len(), 4);
    }

    #[tokio::test]
    async fn merges_when_path_already_exists() {
        let mut g = ResourceGraph::new();
        let a = g
            .add_resource(Box::new(GroupResource::new("a", Some("web"))))
            .unwrap();
        let b = g
            .add_resource(Box::new(GroupResource::new("b", Some("web"))))
            .unwrap();
        let x = g
            .add_resource(Box::new(GroupResource::new("x", None)))
            .unwrap();
        let y = g
            .add_resource(Box::new(GroupResource::new("y", None)))
            .unwrap();
        g.add_edge(x, a, Edge::new("e1"));
        g.add_edge(b, y, Edge::new("e2"));
        // x already reaches y directly, so merging a and b doesn't introduce anything new.
        g.add_edge(x, y, Edge::new("e3"));

        let removed = autogroup(&mut g).await;
        assert_eq!(removed, 1);
        assert_eq!(g.len(), 3);
    }
}
