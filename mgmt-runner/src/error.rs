//! The outer loop's own error taxonomy (§7), composed from every subsystem it drives
//! directly: the Deploy Bus, the GAPI registry/frontend, and the engine.

use mgmt_deploy::DeployError;
use mgmt_engine::EngineError;
use mgmt_gapi::GapiError;

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Gapi(#[from] GapiError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{0}")]
    Fatal(String),
}
