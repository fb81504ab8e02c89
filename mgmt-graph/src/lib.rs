//! The Graph Primitive: a generic typed DAG over arbitrary vertex/edge payloads.
//!
//! This is the leaf of the workspace — [`mgmt-rgraph`] builds the resource graph on top of
//! it, and [`mgmt-fgraph`] builds the function graph on top of it. Neither scheduling nor
//! any notion of "live" state lives here; this crate only knows about graph shape.

use std::fmt::Debug;
use std::hash::Hash;

use fnv::FnvHashMap as HashMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;

pub type VertexId = NodeIndex<u32>;
pub type EdgeId = EdgeIndex<u32>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("vertex not found")]
    NoSuchVertex,
    #[error("edge not found")]
    NoSuchEdge,
    #[error("graph contains a cycle")]
    Cyclic,
}

/// A generic directed graph keyed by vertex identity. `V` must be `Eq + Hash` so that
/// [`Dag::add_vertex`] can deduplicate by value, keyed the way a long-lived node index
/// needs to be.
#[derive(Clone)]
pub struct Dag<V, E> {
    pg: StableDiGraph<V, E, u32>,
    index: HashMap<V, VertexId>,
}

impl<V, E> Dag<V, E>
where
    V: Clone + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Dag {
            pg: StableDiGraph::default(),
            index: HashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.pg.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.pg.node_count() == 0
    }

    pub fn vertex_id(&self, v: &V) -> Option<VertexId> {
        self.index.get(v).copied()
    }

    pub fn vertex(&self, id: VertexId) -> Option<&V> {
        self.pg.node_weight(id)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut V> {
        self.pg.node_weight_mut(id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &V)> {
        self.pg.node_indices().map(|id| (id, &self.pg[id]))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, VertexId, VertexId, &E)> {
        self.pg
            .edge_references()
            .map(|e| (e.id(), e.source(), e.target(), e.weight()))
    }

    /// Inserts `v` if no equal vertex is already present, returning its id either way.
    pub fn add_vertex(&mut self, v: V) -> VertexId {
        if let Some(&id) = self.index.get(&v) {
            return id;
        }
        let id = self.pg.add_node(v.clone());
        self.index.insert(v, id);
        id
    }

    /// Removes a vertex and its incident edges. Backed by `StableDiGraph` specifically so
    /// this never renumbers any other vertex's id — callers (GraphSync, autogroup) hold
    /// `VertexId`s across delete calls and would otherwise silently start indexing the
    /// wrong node.
    pub fn delete_vertex(&mut self, id: VertexId) -> Result<(), GraphError> {
        let v = self.pg.node_weight(id).cloned().ok_or(GraphError::NoSuchVertex)?;
        self.pg.remove_node(id).ok_or(GraphError::NoSuchVertex)?;
        self.index.remove(&v);
        Ok(())
    }

    pub fn add_edge(&mut self, from: VertexId, to: VertexId, e: E) -> EdgeId {
        self.pg.add_edge(from, to, e)
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> Result<(), GraphError> {
        self.pg.remove_edge(id).map(|_| ()).ok_or(GraphError::NoSuchEdge)
    }

    pub fn edges_between(&self, from: VertexId, to: VertexId) -> Vec<EdgeId> {
        self.pg
            .edges_connecting(from, to)
            .map(|e| e.id())
            .collect()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&E> {
        self.pg.edge_weight(id)
    }

    pub fn incoming(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.pg.neighbors_directed(id, Direction::Incoming)
    }

    pub fn outgoing(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.pg.neighbors_directed(id, Direction::Outgoing)
    }

    pub fn outgoing_edges(&self, id: VertexId) -> impl Iterator<Item = (EdgeId, VertexId, &E)> + '_ {
        self.pg
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), e.weight()))
    }

    pub fn incoming_edges(&self, id: VertexId) -> impl Iterator<Item = (EdgeId, VertexId, &E)> + '_ {
        self.pg
            .edges_directed(id, Direction::Incoming)
            .map(|e| (e.id(), e.source(), e.weight()))
    }

    /// Returns the id of the first vertex for which `pred` holds. Used to detect
    /// duplicate (kind, name) pairs before inserting a new resource.
    pub fn vertex_match<F>(&self, mut pred: F) -> Option<VertexId>
    where
        F: FnMut(&V) -> bool,
    {
        self.pg.node_indices().find(|&id| pred(&self.pg[id]))
    }

    /// Would adding an edge `from -> to` introduce a cycle? Equivalent to asking whether
    /// `to` can already reach `from`.
    pub fn would_cycle(&self, from: VertexId, to: VertexId) -> bool {
        if from == to {
            return true;
        }
        self.reachable(to).contains(&from)
    }

    /// All vertices reachable from `from` (excluding itself), via a BFS walk.
    pub fn reachable(&self, from: VertexId) -> Vec<VertexId> {
        let mut bfs = Bfs::new(&self.pg, from);
        let mut out = Vec::new();
        // Skip the start node itself.
        bfs.next(&self.pg);
        while let Some(id) = bfs.next(&self.pg) {
            out.push(id);
        }
        out
    }

    pub fn topological_sort(&self) -> Result<Vec<VertexId>, GraphError> {
        petgraph::algo::toposort(&self.pg, None).map_err(|_| GraphError::Cyclic)
    }

    pub fn is_acyclic(&self) -> bool {
        !petgraph::algo::is_cyclic_directed(&self.pg)
    }

    /// A depth-first pre-order walk starting at `from`.
    pub fn dfs(&self, from: VertexId) -> Vec<VertexId> {
        let mut dfs = petgraph::visit::Dfs::new(&self.pg, from);
        let mut out = Vec::new();
        while let Some(id) = dfs.next(&self.pg) {
            out.push(id);
        }
        out
    }
}

impl<V, E> Dag<V, E>
where
    V: Clone + Eq + Hash + Debug,
    E: Clone,
{
    /// Returns a new graph with every edge's direction flipped, vertices unchanged.
    /// Used both by reversal-injection (mgmt-rgraph) and by the engine's shutdown walk.
    pub fn reverse(&self) -> Self {
        let mut pg = StableDiGraph::default();
        let mut mapping = HashMap::default();
        for id in self.pg.node_indices() {
            let new_id = pg.add_node(self.pg[id].clone());
            mapping.insert(id, new_id);
        }
        for e in self.pg.edge_references() {
            pg.add_edge(mapping[&e.target()], mapping[&e.source()], e.weight().clone());
        }
        let mut index = HashMap::default();
        for id in pg.node_indices() {
            index.insert(pg[id].clone(), id);
        }
        Dag { pg, index }
    }
}

impl<V, E> Default for Dag<V, E>
where
    V: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_vertex_dedupes() {
        let mut g: Dag<&str, ()> = Dag::new();
        let a1 = g.add_vertex("a");
        let a2 = g.add_vertex("a");
        assert_eq!(a1, a2);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn topo_sort_detects_cycle() {
        let mut g: Dag<&str, ()> = Dag::new();
        let a = g.add_vertex("a");
        let b = g.add_vertex("b");
        g.add_edge(a, b, ());
        g.add_edge(b, a, ());
        assert_eq!(g.topological_sort(), Err(GraphError::Cyclic));
    }

    #[test]
    fn topo_sort_orders_dependencies() {
        let mut g: Dag<&str, ()> = Dag::new();
        let a = g.add_vertex("a");
        let b = g.add_vertex("b");
        let c = g.add_vertex("c");
        g.add_edge(a, b, ());
        g.add_edge(b, c, ());
        let order = g.topological_sort().unwrap();
        let pos = |id: VertexId| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn reachable_excludes_self() {
        let mut g: Dag<&str, ()> = Dag::new();
        let a = g.add_vertex("a");
        let b = g.add_vertex("b");
        g.add_edge(a, b, ());
        assert_eq!(g.reachable(a), vec![b]);
        assert!(g.reachable(b).is_empty());
    }

    #[test]
    fn would_cycle_detects_back_edge() {
        let mut g: Dag<&str, ()> = Dag::new();
        let a = g.add_vertex("a");
        let b = g.add_vertex("b");
        g.add_edge(a, b, ());
        assert!(g.would_cycle(b, a));
        assert!(!g.would_cycle(a, b));
    }

    #[test]
    fn reverse_flips_edges() {
        let mut g: Dag<&str, u32> = Dag::new();
        let a = g.add_vertex("a");
        let b = g.add_vertex("b");
        g.add_edge(a, b, 7);
        let r = g.reverse();
        let ra = r.vertex_id(&"a").unwrap();
        let rb = r.vertex_id(&"b").unwrap();
        assert_eq!(r.outgoing(rb).collect::<Vec<_>>(), vec![ra]);
    }

    #[test]
    fn delete_vertex_removes_from_index() {
        let mut g: Dag<&str, ()> = Dag::new();
        let a = g.add_vertex("a");
        g.delete_vertex(a).unwrap();
        assert!(g.vertex_id(&"a").is_none());
        assert_eq!(g.len(), 0);
    }

    #[test]
    fn delete_vertex_preserves_other_ids() {
        let mut g: Dag<&str, ()> = Dag::new();
        let a = g.add_vertex("a");
        let b = g.add_vertex("b");
        let c = g.add_vertex("c");
        g.delete_vertex(b).unwrap();
        assert_eq!(g.vertex(a), Some(&"a"));
        assert_eq!(g.vertex(c), Some(&"c"));
    }

    #[test]
    fn incoming_edges_reports_source_and_weight() {
        let mut g: Dag<&str, u32> = Dag::new();
        let a = g.add_vertex("a");
        let b = g.add_vertex("b");
        g.add_edge(a, b, 9);
        let incoming: Vec<_> = g.incoming_edges(b).collect();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].1, a);
        assert_eq!(*incoming[0].2, 9);
    }
}
