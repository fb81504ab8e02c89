//! The engine's own error taxonomy (§7, §10.2), composed with the upstream crates it
//! actually drives: the resource graph, resources themselves, and the function graph.
//! GAPI, the Deploy Bus, and the unifier are Outer Loop concerns (§4.9) the engine never
//! touches directly, so their errors stay out of this enum.

use mgmt_fgraph::FGraphError;
use mgmt_resource::ResourceError;
use mgmt_rgraph::RGraphError;
use mgmt_world::WorldError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("staged graph is cyclic")]
    Cyclic,
    #[error("recv source not found in staged graph: {0}")]
    DanglingRecv(String),
    #[error("send/recv type mismatch on {resource}.{field}: expected {expected}, got {actual}")]
    TypeMismatch {
        resource: String,
        field: String,
        expected: String,
        actual: String,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// A prior `Commit` failed partway through `Init`; the live graph is in an unknown
    /// state and the engine refuses to `Resume` until a fresh deploy lands (§4.4).
    #[error("live graph is destroyed: {0}")]
    Destroyed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Graph(#[from] RGraphError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    FuncGraph(#[from] FGraphError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("{0}")]
    Fatal(String),
}
