//! The resource graph's vertex type: an identity (kind, name) paired with the live
//! boxed [`Resource`], shared behind a lock so the engine can hold a `VertexId` while a
//! per-vertex task owns exclusive runtime access to the resource itself.

use std::fmt;
use std::sync::Arc;

use mgmt_resource::Resource;
use tokio::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: String,
    pub name: String,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

/// A vertex in the resource graph. Equality and hashing are over [`ResourceId`] only —
/// two vertices with the same id are the same graph position, whatever instance of the
/// resource happens to be inside, which is exactly the "no duplicate (kind, name)"
/// invariant (§3) `mgmt_graph::Dag::add_vertex`'s dedup relies on.
#[derive(Clone)]
pub struct ResourceVertex {
    pub id: ResourceId,
    pub resource: Arc<Mutex<Box<dyn Resource>>>,
}

impl ResourceVertex {
    pub fn new(resource: Box<dyn Resource>) -> Self {
        let id = ResourceId {
            kind: resource.kind().to_string(),
            name: resource.name().to_string(),
        };
        ResourceVertex {
            id,
            resource: Arc::new(Mutex::new(resource)),
        }
    }
}

impl fmt::Debug for ResourceVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceVertex({})", self.id)
    }
}

impl PartialEq for ResourceVertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ResourceVertex {}

impl std::hash::Hash for ResourceVertex {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}
