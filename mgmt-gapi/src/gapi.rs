//! The GAPI contract (§6, §4.9): a pluggable frontend that produces resource graphs and a
//! stream of rebuild ticks. The outer loop owns exactly one live `Gapi` at a time.

use std::sync::Arc;

use async_trait::async_trait;
use mgmt_rgraph::ResourceGraph;
use mgmt_world::World;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GapiError {
    #[error("gapi {0} failed to initialize: {1}")]
    Init(String, String),
    #[error("gapi {0} failed to build graph: {1}")]
    Graph(String, String),
    #[error("no such gapi registered: {0}")]
    UnknownGapi(String),
    #[error("gapi {0} payload could not be decoded: {1}")]
    Decode(String, String),
}

/// One tick from a GAPI's Next stream. `fast_pause` asks the engine to pre-empt the
/// currently running graph (§4.9's "fast pause is propagated from GAPI Next events")
/// rather than letting in-flight CheckApplys finish naturally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NextEvent {
    pub fast_pause: bool,
}

/// A streaming frontend producing a sequence of resource graphs (§1, §4.9).
#[async_trait]
pub trait Gapi: Send + Sync {
    fn name(&self) -> &str;

    /// Called once after construction, before the first `graph()`/`next()` call.
    async fn init(&mut self, world: Arc<dyn World>) -> Result<(), GapiError>;

    /// Builds (or rebuilds) the candidate resource graph. Called once per `next()` tick.
    async fn graph(&self) -> Result<ResourceGraph, GapiError>;

    /// Awaits the next rebuild tick. `None` means the frontend has no more graphs to
    /// offer; the outer loop then idles on this GAPI until a new deploy arrives.
    async fn next(&mut self) -> Option<NextEvent>;

    async fn close(&mut self) -> Result<(), GapiError> {
        Ok(())
    }
}

/// A named GAPI constructor (§3's "a peer without the original source can reconstruct the
/// GAPI by name lookup"): given the raw bytes from a deploy payload, builds a concrete
/// `Gapi` instance. Kept separate from `Gapi` itself since construction is synchronous and
/// doesn't need a `World` (that's supplied later via `Gapi::init`).
pub trait GettableGapi: Send + Sync {
    fn name(&self) -> &str;
    fn build(&self, payload: &[u8]) -> Result<Box<dyn Gapi>, GapiError>;
}
