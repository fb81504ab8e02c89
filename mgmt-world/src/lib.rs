//! The `World` capability bundle (§3's World collaborator): hostname, a cluster KV with
//! Get/Put/Delete/Watch/Lease, a scheduler factory, an exported-resource pool, and a
//! filesystem prefix for deploy payloads.
//!
//! Embedded etcd lifecycle is explicitly out of scope (§1); this crate only pins down the
//! KV/Watch/Lease *contract* (§6's "Cluster KV contract") and ships an in-process
//! implementation of it (`kv::MemoryKv`) that satisfies every invariant a real cluster KV
//! would, so the rest of the workspace — and its tests — never need a live cluster.

pub mod kv;
pub mod world;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("compare-and-swap failed for key: {0}")]
    CasConflict(String),
    #[error("lease expired or unknown: {0}")]
    NoSuchLease(u64),
    #[error("scheduler namespace has no capacity: {0}")]
    NoCapacity(String),
}

/// One KV mutation, as delivered by [`Kv::watch`]. `prefix` watches deliver every key
/// under the prefix; `rev` is a per-store monotonic revision used to order events.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent {
    Put { key: String, value: Vec<u8>, rev: u64 },
    Delete { key: String, rev: u64 },
}

/// The Cluster KV contract (§6): Get/Put(+CAS)/Delete/Watch, namespaced under a root
/// prefix by the caller (this trait itself is prefix-agnostic).
#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WorldError>;

    /// Puts `value` at `key`. If `cas` is `Some(expected)`, the put only succeeds if the
    /// key's current value equals `expected` (`None` meaning "must not currently exist").
    async fn put(&self, key: &str, value: Vec<u8>, cas: Option<Option<Vec<u8>>>) -> Result<(), WorldError>;

    async fn delete(&self, key: &str) -> Result<(), WorldError>;

    /// Subscribes to every `Put`/`Delete` under `prefix`, including ones that raced the
    /// subscription (i.e. replays nothing — a watch only sees events after it attaches,
    /// which is why the Deploy Bus always re-polls `GetMaxDeployID` on activity rather
    /// than trusting the watch payload itself).
    fn watch(&self, prefix: &str) -> tokio::sync::broadcast::Receiver<WatchEvent>;

    /// Lists every key currently stored under `prefix`, with its value, ordered by key.
    /// Used by crash-recovery scans (the reversal table) that need to enumerate durable
    /// markers rather than check one key at a time.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, WorldError>;
}

#[async_trait]
pub trait Lease: Send + Sync {
    fn id(&self) -> u64;
    async fn keep_alive(&self) -> Result<(), WorldError>;
    async fn revoke(&self) -> Result<(), WorldError>;
}

#[derive(Clone, Debug, Default)]
pub struct SchedulerOpts {
    pub count: usize,
}

/// An exported resource, collected from `@@`-prefixed names (§6). The `pattern` is an
/// opaque-to-the-engine expression interpreted only by the concrete resource kind that
/// produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportedResource {
    pub host: String,
    pub kind: String,
    pub name: String,
    pub pattern: Option<String>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Elects a set of hostnames for `namespace`, per `opts.count`.
    async fn schedule(&self, namespace: &str, opts: SchedulerOpts) -> Result<Vec<String>, WorldError>;
}

#[async_trait]
pub trait World: Send + Sync {
    fn hostname(&self) -> &str;
    fn kv(&self) -> &dyn Kv;
    /// An owned handle to the same KV `kv()` borrows from, for collaborators (the Deploy
    /// Bus, the engine's reversal table) that need to hold a KV handle past the lifetime
    /// of any single call.
    fn kv_arc(&self) -> Arc<dyn Kv>;
    async fn lease(&self, ttl: std::time::Duration) -> Result<Box<dyn Lease>, WorldError>;
    fn scheduler(&self) -> &dyn Scheduler;
    async fn res_export(&self, host: &str, resources: Vec<ExportedResource>) -> Result<(), WorldError>;
    async fn res_collect(&self, hosts: &[String], kinds: &[String]) -> Result<Vec<ExportedResource>, WorldError>;
    /// Working directory for deploy payloads and per-resource state.
    fn prefix(&self) -> &std::path::Path;
    /// Optional URI identifying the deploy root, exposed to resources via GAPI::Info.
    fn uri(&self) -> Option<&str>;
}

pub fn default_prefix() -> PathBuf {
    if let Ok(dir) = std::env::var("STATE_DIRECTORY") {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(dir).join("mgmt");
    }
    std::env::temp_dir().join("mgmt")
}
