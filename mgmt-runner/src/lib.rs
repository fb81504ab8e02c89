//! The Outer Loop (§4.9, §6): wires the Deploy Bus to a GAPI frontend to the Graph
//! Engine, owns the `RunConfig` CLI surface, and handles signal-driven shutdown.

pub mod config;
pub mod error;
pub mod graphviz;
pub mod outer_loop;
pub mod signal;

pub use config::{Cli, Command};
pub use error::RunnerError;
pub use outer_loop::{Overrides, OuterLoop};
pub use signal::ShutdownRequest;
