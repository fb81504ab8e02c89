//! The Resource Contract (§4.1): a polymorphic trait implemented by each resource kind,
//! plus the meta-parameters and value types every kind shares.

pub mod meta;
pub mod noop;
pub mod resource;
pub mod value;

pub use meta::{MetaParams, SemaToken};
pub use noop::{NoopResource, TestResource};
pub use resource::{
    type_check_recv, CmpMismatch, Groupable, InitArgs, RecvSource, Recvable, Resource,
    ResourceError, Sendable, Uid, UidPattern, WatchEvent, WatchSender,
};
pub use value::{Value, ValueType};
