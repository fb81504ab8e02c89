//! The Resource Graph (§4.2, §4.3): a DAG of live [`Resource`] instances wired together
//! by Send/Recv edges, plus the three rewrite passes the engine runs at Commit time —
//! [`autoedge::autoedge`], [`autogroup::autogroup`], and [`reversal::inject_reversals`] —
//! and [`sync::graph_sync`], which carries running vertices across a deploy.

pub mod autoedge;
pub mod autogroup;
mod edge;
mod graph;
pub mod reversal;
pub mod sync;
#[cfg(test)]
mod test_support;
mod vertex;

pub use edge::{Edge, SendRecvMapping};
pub use graph::{RGraphError, ResourceGraph};
pub use reversal::ReversalTable;
pub use sync::SyncReport;
pub use vertex::{ResourceId, ResourceVertex};

pub use autoedge::autoedge;
pub use autogroup::autogroup;
pub use reversal::inject_reversals;
pub use sync::graph_sync;
