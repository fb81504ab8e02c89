//! The Function Graph (§4.5): a DAG of [`FuncVertex`]es connected by named-argument
//! edges. Invariant: every non-source vertex's inbound edges exactly match its argument
//! list (checked by [`FuncGraph::validate`]).

use mgmt_graph::{Dag, EdgeId, GraphError, VertexId};

use crate::vertex::{FuncId, FuncVertex};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArgEdge {
    pub arg_name: String,
}

impl ArgEdge {
    pub fn new(arg_name: impl Into<String>) -> Self {
        ArgEdge {
            arg_name: arg_name.into(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FGraphError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("duplicate function id: {0}")]
    Duplicate(FuncId),
    #[error("vertex {0} is missing required argument {1}")]
    MissingArg(FuncId, String),
    #[error("vertex {0} has an edge for unknown argument {1}")]
    UnknownArg(FuncId, String),
}

#[derive(Clone)]
pub struct FuncGraph {
    pub(crate) dag: Dag<FuncVertex, ArgEdge>,
}

impl FuncGraph {
    pub fn new() -> Self {
        FuncGraph { dag: Dag::new() }
    }

    pub fn len(&self) -> usize {
        self.dag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    pub fn add_function(&mut self, vertex: FuncVertex) -> Result<VertexId, FGraphError> {
        if self.dag.vertex_id(&vertex).is_some() {
            return Err(FGraphError::Duplicate(vertex.id));
        }
        Ok(self.dag.add_vertex(vertex))
    }

    pub fn find(&self, id: &FuncId) -> Option<VertexId> {
        self.dag.vertex_match(|v| &v.id == id)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&FuncVertex> {
        self.dag.vertex(id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &FuncVertex)> {
        self.dag.vertices()
    }

    pub fn add_edge(&mut self, from: VertexId, to: VertexId, edge: ArgEdge) -> EdgeId {
        self.dag.add_edge(from, to, edge)
    }

    pub fn delete_vertex(&mut self, id: VertexId) -> Result<(), FGraphError> {
        Ok(self.dag.delete_vertex(id)?)
    }

    pub fn incoming_edges(&self, id: VertexId) -> impl Iterator<Item = (EdgeId, VertexId, &ArgEdge)> + '_ {
        self.dag.incoming_edges(id)
    }

    pub fn outgoing_edges(&self, id: VertexId) -> impl Iterator<Item = (EdgeId, VertexId, &ArgEdge)> + '_ {
        self.dag.outgoing_edges(id)
    }

    pub fn topological_sort(&self) -> Result<Vec<VertexId>, FGraphError> {
        Ok(self.dag.topological_sort()?)
    }

    /// Checks the graph is acyclic and that every vertex's inbound `arg_name`s exactly
    /// match the set its `Info().signature.args` declares (§3's Function Graph invariant).
    /// Reads each vertex's signature via `try_lock`, which is safe here because
    /// `validate` only ever runs while the graph is paused between Commits, same as
    /// `mgmt_rgraph::sync::graph_sync`'s use of `try_lock`.
    pub fn validate(&self) -> Result<(), FGraphError> {
        self.topological_sort()?;
        for (id, vertex) in self.dag.vertices() {
            let declared = declared_args(vertex)?;
            let mut wired: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
            for (_, _, edge) in self.dag.incoming_edges(id) {
                if !declared.contains(&edge.arg_name) {
                    return Err(FGraphError::UnknownArg(vertex.id.clone(), edge.arg_name.clone()));
                }
                wired.insert(edge.arg_name.clone());
            }
            for arg in &declared {
                if !wired.contains(arg) {
                    return Err(FGraphError::MissingArg(vertex.id.clone(), arg.clone()));
                }
            }
        }
        Ok(())
    }
}

fn declared_args(vertex: &FuncVertex) -> Result<std::collections::BTreeSet<String>, FGraphError> {
    let guard = vertex
        .function
        .try_lock()
        .expect("validate runs only while the graph is paused and uncontended");
    Ok(guard.info().signature.args.into_iter().map(|(name, _)| name).collect())
}

impl Default for FuncGraph {
    fn default() -> Self {
        Self::new()
    }
}
