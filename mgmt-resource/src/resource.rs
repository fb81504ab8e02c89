//! The Resource contract (§4.1): Init/Watch/CheckApply/Cmp/Interrupt/Close, plus the
//! optional Sendable/Recvable capabilities (§3) that let resources exchange typed field
//! values at runtime.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mgmt_world::World;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::meta::MetaParams;
use crate::value::{Value, ValueType};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CmpMismatch {
    #[error("kind differs: {0} != {1}")]
    Kind(String, String),
    #[error("name differs: {0} != {1}")]
    Name(String, String),
    #[error("config differs: {0}")]
    Config(String),
    #[error("meta differs: {0:?} != {1:?}")]
    Meta(MetaParams, MetaParams),
}

/// Errors a resource can surface. `Watch` is always `Fatal` per §4.1; `CheckApply` errors
/// are `Apply` and go through the engine's retry loop (§4.1, §4.4).
#[derive(thiserror::Error, Debug, Clone)]
pub enum ResourceError {
    #[error("watch failed: {0}")]
    Fatal(String),
    #[error("check_apply failed: {0}")]
    Apply(String),
    #[error("send/recv type mismatch on field {field}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        field: String,
        expected: ValueType,
        actual: ValueType,
    },
}

/// Everything a resource's `Init` needs: the world handle, a working-directory prefix,
/// and a cancellation token every suspension point must select on (§5).
pub struct InitArgs {
    pub world: Arc<dyn World>,
    pub prefix: PathBuf,
    pub debug: bool,
    pub cancel: CancellationToken,
}

impl InitArgs {
    /// A logging target string resources can prefix their `log::` calls with, e.g.
    /// `"mgmt::resource[file/etc-hosts]"`. Logging itself goes through the global `log`
    /// facade, not a handle threaded through here.
    pub fn log_target(kind: &str, name: &str) -> String {
        format!("mgmt::resource[{kind}/{name}]")
    }
}

/// Sent by `Watch` whenever a CheckApply may be needed. The first event after `Init` must
/// always be `Ready` (§4.1's "must emit one initial ready event").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    Ready,
    Changed,
}

pub type WatchSender = mpsc::Sender<WatchEvent>;

/// The core per-kind contract. Implementors own whatever OS-level watchers or handles
/// they acquire in `init` and must release them in `close`.
#[async_trait]
pub trait Resource: Send + Sync + Debug {
    fn kind(&self) -> &str;
    fn name(&self) -> &str;
    fn meta(&self) -> &MetaParams;
    fn meta_mut(&mut self) -> &mut MetaParams;

    /// Lets `cmp_config` and the autogroup/autoedge machinery downcast a `&dyn Resource`
    /// back to its concrete kind, the way a capability-per-trait design still needs *some*
    /// way to compare same-kind configs without a kind-indexed enum.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Total structural equality over kind + name + config + meta (§3). Used by
    /// GraphSync (§4.2) to decide whether a vertex can be reused across a deploy.
    fn cmp(&self, other: &dyn Resource) -> Result<(), CmpMismatch> {
        if self.kind() != other.kind() {
            return Err(CmpMismatch::Kind(
                self.kind().to_string(),
                other.kind().to_string(),
            ));
        }
        if self.name() != other.name() {
            return Err(CmpMismatch::Name(
                self.name().to_string(),
                other.name().to_string(),
            ));
        }
        if self.meta() != other.meta() {
            return Err(CmpMismatch::Meta(self.meta().clone(), other.meta().clone()));
        }
        self.cmp_config(other)
    }

    /// Kind-specific config comparison, the part of `cmp` that varies per resource kind.
    fn cmp_config(&self, other: &dyn Resource) -> Result<(), CmpMismatch>;

    async fn init(&mut self, args: &InitArgs) -> Result<(), ResourceError>;

    /// Sets up monitoring and sends `WatchEvent::Ready` once `events` is ready to receive
    /// further `Changed` events. Takes `&self`, not `&mut self`, deliberately: this lets the
    /// engine run `watch` concurrently with `check_apply` on the same resource instance
    /// (§4.1's "long-lived coroutine" does not have to be this call's own future — a kind
    /// that needs to keep watching after returning here spawns its own detached task before
    /// returning, cloning `events` into it, and owns whatever OS-level watcher state that
    /// task needs behind its own interior mutability). Must honor `args.cancel` for any work
    /// it does spawn. Resources with nothing to watch (like the reference `noop`/`test`
    /// kinds) just send `Ready` and return.
    async fn watch(&self, args: &InitArgs, events: WatchSender) -> Result<(), ResourceError>;

    /// Idempotent. When `apply` is `false` this must not mutate any state (dry-run).
    /// Returns `true` if state was already correct (or, for `apply=true`, the call did
    /// not need to change anything) — i.e. `Ok(false)` marks the call "eventful" and
    /// triggers downstream propagation per §4.4.
    async fn check_apply(&mut self, apply: bool) -> Result<bool, ResourceError>;

    /// Best-effort preemption, invoked by the engine after it has already raced the
    /// in-flight `check_apply` future against `args.cancel` and won (§5's Interrupt is
    /// "the fastest variant"). Default no-op for resources with nothing to clean up.
    fn interrupt(&mut self) {}

    async fn close(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Typed UIDs this resource provides, for autoedge (§4.3). Most kinds provide none.
    fn provides(&self) -> Vec<Uid> {
        Vec::new()
    }

    /// Typed UID patterns this resource requires, for autoedge (§4.3).
    fn requires(&self) -> Vec<UidPattern> {
        Vec::new()
    }

    /// If this resource applies state that should be undone when a later deploy drops
    /// it, returns the synthesized "undo" resource to inject (§4.3's Reversals).
    fn reversal(&self) -> Option<Box<dyn Resource>> {
        None
    }

    /// Upcasts to the [`Groupable`] capability, for kinds that implement it. Needed
    /// because autogroup operates over `&dyn Resource` without knowing concrete kinds;
    /// same shape as `as_any`, one level up.
    fn as_groupable(&self) -> Option<&dyn Groupable> {
        None
    }

    /// Mutable counterpart of [`Resource::as_groupable`], used by the merge step.
    fn as_groupable_mut(&mut self) -> Option<&mut dyn Groupable> {
        None
    }

    /// Upcasts to the [`Sendable`] capability, same shape as [`Resource::as_groupable`].
    /// Used by the engine's Commit-time type check and by its Send/Recv wiring at
    /// admission to `checking` (§4.4).
    fn as_sendable(&self) -> Option<&dyn Sendable> {
        None
    }

    /// Upcasts to the [`Recvable`] capability (read-only view, for type checks).
    fn as_recvable(&self) -> Option<&dyn Recvable> {
        None
    }

    /// Mutable counterpart of [`Resource::as_recvable`], used to deliver a received value.
    fn as_recvable_mut(&mut self) -> Option<&mut dyn Recvable> {
        None
    }
}

/// A typed identifier a resource kind advertises as "provided", matched against other
/// kinds' [`UidPattern`]s to synthesize autoedges (§4.3). The engine does not assume any
/// fixed schema of kinds or uid shapes — this is deliberately just two strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Uid {
    pub kind: String,
    pub name: String,
}

/// A requirement pattern. `name_glob` supports a trailing `*` wildcard, matched against
/// candidate [`Uid::name`]s of matching `kind`; anything more expressive is left to each
/// resource kind's own autoedge metadata (§9's open question on the autoedge UID schema).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UidPattern {
    pub kind: String,
    pub name_glob: String,
}

impl UidPattern {
    pub fn matches(&self, uid: &Uid) -> bool {
        if self.kind != uid.kind {
            return false;
        }
        match self.name_glob.strip_suffix('*') {
            Some(prefix) => uid.name.starts_with(prefix),
            None => self.name_glob == uid.name,
        }
    }
}

/// The autogroup capability (§4.3): resources that opt in advertise a merge key and know
/// how to absorb a compatible sibling into themselves.
pub trait Groupable: Resource {
    /// Resources with the same `Some(key)` (and matching kind) are merge candidates.
    /// `None` means "never group this resource".
    fn group_key(&self) -> Option<String>;

    /// Absorbs `other` into `self`, forming the composite vertex's delegation list.
    fn merge(&mut self, other: Box<dyn Resource>) -> Result<(), ResourceError>;
}

/// A capability exposed by resources that publish fields for other resources to `Recv`.
pub trait Sendable: Resource {
    /// The current value of every field this resource can send, by field name.
    fn send_fields(&self) -> BTreeMap<String, Value>;

    fn send_field_type(&self, field: &str) -> Option<ValueType> {
        self.send_fields().get(field).map(Value::type_of)
    }
}

/// A reference to another resource's send field, as declared in the frontend graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecvSource {
    pub source_kind: String,
    pub source_name: String,
    pub source_field: String,
}

/// A capability exposed by resources that consume fields wired in from a `Sendable`
/// resource elsewhere in the graph.
pub trait Recvable: Resource {
    /// The recv wiring declared for this resource: local field name -> source reference.
    fn recv_fields(&self) -> BTreeMap<String, RecvSource>;

    fn recv_field_type(&self, field: &str) -> Option<ValueType>;

    /// Applies a received value to the named field. Must be type-checked by the caller
    /// (the engine, at Commit time and again defensively here) against
    /// `recv_field_type` — §9's "do not rely on late runtime failures".
    fn set_recv(&mut self, field: &str, value: Value) -> Result<(), ResourceError>;

    /// The last value received for a field, used by GraphSync's SendRecv mapping
    /// (§4.2) so a freshly-synced resource can be compared against the *received*
    /// state its predecessor held, not just its declarative form.
    fn get_recv(&self, field: &str) -> Option<Value>;
}

pub fn type_check_recv(
    field: &str,
    expected: Option<ValueType>,
    value: &Value,
) -> Result<(), ResourceError> {
    match expected {
        Some(expected) if expected == value.type_of() => Ok(()),
        Some(expected) => Err(ResourceError::TypeMismatch {
            field: field.to_string(),
            expected,
            actual: value.type_of(),
        }),
        None => Err(ResourceError::TypeMismatch {
            field: field.to_string(),
            expected: ValueType::Unit,
            actual: value.type_of(),
        }),
    }
}
