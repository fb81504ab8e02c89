//! The GAPI layer (§6): the `Gapi`/`GettableGapi` contracts frontends implement, a named
//! registry the Deploy Bus uses to reconstruct a frontend from a deploy payload, and one
//! reference frontend (`StaticGapi`) used by the empty-deploy bootstrap and by tests.

mod gapi;
pub mod registry;
pub mod static_gapi;

pub use gapi::{Gapi, GapiError, GettableGapi, NextEvent};
pub use registry::Registry;
pub use static_gapi::{StaticGapi, StaticGapiFactory, StaticSpec};
