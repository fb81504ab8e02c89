//! The function graph's vertex type, mirroring `mgmt_rgraph::vertex`'s shape: an
//! identity-by-name wrapper around a shared, lockable boxed [`Function`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::function::Function;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub String);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
pub struct FuncVertex {
    pub id: FuncId,
    pub function: Arc<Mutex<Box<dyn Function>>>,
}

impl FuncVertex {
    pub fn new(id: impl Into<String>, function: Box<dyn Function>) -> Self {
        FuncVertex {
            id: FuncId(id.into()),
            function: Arc::new(Mutex::new(function)),
        }
    }
}

impl fmt::Debug for FuncVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuncVertex({})", self.id)
    }
}

impl PartialEq for FuncVertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FuncVertex {}

impl std::hash::Hash for FuncVertex {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}
