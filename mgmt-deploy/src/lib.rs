//! The Deploy Bus (§4.8): an immutable, hash-chained log of [`Deploy`] records over the
//! world KV, with a genesis-bootstrap convenience ([`Deploy::empty`]) for running an empty
//! graph before any real deploy has landed.

mod bus;
mod deploy;

pub use bus::{DeployBus, DeployError};
pub use deploy::Deploy;
