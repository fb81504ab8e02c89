//! The GAPI Registry (§2, §6): a name -> constructor lookup used by the Deploy Bus (§4.8)
//! to turn a deploy's `{name, payload}` pair back into a live `Gapi`.

use std::collections::HashMap;

use crate::gapi::{Gapi, GapiError, GettableGapi};

#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Box<dyn GettableGapi>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            factories: HashMap::new(),
        }
    }

    /// Registers a frontend under its own name, overwriting any prior registration for
    /// that name (later registrations win, matching a plugin registry's usual semantics).
    pub fn register(&mut self, factory: Box<dyn GettableGapi>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn build(&self, name: &str, payload: &[u8]) -> Result<Box<dyn Gapi>, GapiError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| GapiError::UnknownGapi(name.to_string()))?;
        factory.build(payload)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}
