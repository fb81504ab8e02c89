//! The Resource Graph (§4.2): a thin, identity-aware wrapper over [`mgmt_graph::Dag`].

use mgmt_graph::{Dag, EdgeId, GraphError, VertexId};
use mgmt_resource::Resource;

use crate::edge::Edge;
use crate::vertex::{ResourceId, ResourceVertex};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RGraphError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("duplicate resource: {0}")]
    Duplicate(ResourceId),
    #[error("recv source not found in graph: {0}")]
    DanglingRecv(ResourceId),
}

pub struct ResourceGraph {
    pub(crate) dag: Dag<ResourceVertex, Edge>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        ResourceGraph { dag: Dag::new() }
    }

    pub fn len(&self) -> usize {
        self.dag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    /// Adds a resource, failing if a vertex with the same (kind, name) already exists
    /// (§3's "no duplicate (kind,name)" invariant).
    pub fn add_resource(&mut self, resource: Box<dyn Resource>) -> Result<VertexId, RGraphError> {
        let vertex = ResourceVertex::new(resource);
        if let Some(existing) = self.dag.vertex_id(&vertex) {
            return Err(RGraphError::Duplicate(vertex.id.clone()).tap_existing(existing));
        }
        Ok(self.dag.add_vertex(vertex))
    }

    /// Inserts an already-constructed vertex verbatim, preserving its `Arc` identity.
    /// Used by [`crate::sync::graph_sync`] to carry a reused resource instance across a
    /// deploy without re-wrapping it.
    pub(crate) fn add_vertex_vertex(&mut self, vertex: ResourceVertex) -> VertexId {
        self.dag.add_vertex(vertex)
    }

    pub fn find(&self, id: &ResourceId) -> Option<VertexId> {
        self.dag.vertex_match(|v| &v.id == id)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&ResourceVertex> {
        self.dag.vertex(id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &ResourceVertex)> {
        self.dag.vertices()
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, VertexId, VertexId, &Edge)> {
        self.dag.edges()
    }

    pub fn add_edge(&mut self, from: VertexId, to: VertexId, edge: Edge) -> EdgeId {
        self.dag.add_edge(from, to, edge)
    }

    pub fn delete_vertex(&mut self, id: VertexId) -> Result<(), RGraphError> {
        Ok(self.dag.delete_vertex(id)?)
    }

    pub fn topological_sort(&self) -> Result<Vec<VertexId>, RGraphError> {
        Ok(self.dag.topological_sort()?)
    }

    pub fn would_cycle(&self, from: VertexId, to: VertexId) -> bool {
        self.dag.would_cycle(from, to)
    }

    /// Every vertex reachable from `from`, not including `from` itself.
    pub fn reachable(&self, from: VertexId) -> Vec<VertexId> {
        self.dag.reachable(from)
    }

    pub fn outgoing_edges(&self, id: VertexId) -> impl Iterator<Item = (EdgeId, VertexId, &Edge)> + '_ {
        self.dag.outgoing_edges(id)
    }

    pub fn incoming(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.dag.incoming(id)
    }
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}

// Small helper so `RGraphError::Duplicate` construction above reads naturally; the
// "existing" id isn't otherwise surfaced, matching the distilled spec's treatment of
// duplicate detection as a boolean VertexMatch result rather than returning the prior id.
trait TapExisting {
    fn tap_existing(self, existing: VertexId) -> Self;
}

impl TapExisting for RGraphError {
    fn tap_existing(self, existing: VertexId) -> Self {
        log::debug!("duplicate resource collides with existing vertex {existing:?}");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NoopResource;

    #[test]
    fn add_resource_rejects_duplicate_kind_name() {
        let mut g = ResourceGraph::new();
        g.add_resource(Box::new(NoopResource::new("a"))).unwrap();
        let err = g.add_resource(Box::new(NoopResource::new("a"))).unwrap_err();
        assert!(matches!(err, RGraphError::Duplicate(_)));
    }

    #[test]
    fn find_locates_by_kind_and_name() {
        let mut g = ResourceGraph::new();
        let id = g.add_resource(Box::new(NoopResource::new("a"))).unwrap();
        let found = g
            .find(&ResourceId {
                kind: "noop".to_string(),
                name: "a".to_string(),
            })
            .unwrap();
        assert_eq!(id, found);
    }
}
