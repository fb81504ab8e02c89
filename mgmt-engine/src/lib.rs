//! The Graph Engine and Converger (§4.4, §4.7): diff/commit/pause/resume over the live
//! resource graph, one tokio task per vertex driving Watch events through rate-limiter
//! and semaphore admission into CheckApply, Send->Recv field propagation, and per-host
//! quiescence tracking — plus the function graph scheduler (§4.5), wrapped as a thin
//! passenger since the engine is what starts and stops it.

mod converger;
mod counters;
mod error;
mod ratelimiter;
mod semaphore;
mod vertex;

#[allow(clippy::module_inception)]
mod engine;

pub use converger::Converger;
pub use counters::{Counters, CountersSnapshot};
pub use error::{CommitError, ConfigError, EngineError};
pub use engine::Engine;
pub use ratelimiter::RateLimiter;
pub use semaphore::SemaphoreRegistry;
pub use vertex::{PauseSignal, RecvLink, VertexHandle, VertexOutcome};
