//! A `World` implementation backed entirely by in-process collaborators
//! ([`crate::kv::MemoryKv`], a round-robin scheduler, an in-memory export pool). Used for
//! single-node runs and by every test in this workspace; a cluster deployment would swap
//! this crate's `Kv`/`Scheduler` for ones backed by a real etcd-compatible client while
//! keeping the `World` trait identical.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::kv::{MemoryKv, MemoryLease};
use crate::{ExportedResource, Kv, Lease, Scheduler, SchedulerOpts, World, WorldError};

pub struct RoundRobinScheduler {
    hosts: Vec<String>,
    cursor: Mutex<usize>,
}

impl RoundRobinScheduler {
    pub fn new(hosts: Vec<String>) -> Self {
        RoundRobinScheduler {
            hosts,
            cursor: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Scheduler for RoundRobinScheduler {
    async fn schedule(&self, namespace: &str, opts: SchedulerOpts) -> Result<Vec<String>, WorldError> {
        if self.hosts.is_empty() {
            return Err(WorldError::NoCapacity(namespace.to_string()));
        }
        let count = opts.count.max(1).min(self.hosts.len());
        let mut cursor = self.cursor.lock();
        let mut chosen = Vec::with_capacity(count);
        for _ in 0..count {
            chosen.push(self.hosts[*cursor % self.hosts.len()].clone());
            *cursor += 1;
        }
        Ok(chosen)
    }
}

pub struct InMemoryWorld {
    hostname: String,
    kv: Arc<MemoryKv>,
    scheduler: RoundRobinScheduler,
    exports: Mutex<Vec<ExportedResource>>,
    prefix: PathBuf,
    uri: Option<String>,
}

impl InMemoryWorld {
    pub fn new(hostname: impl Into<String>, prefix: PathBuf) -> Self {
        let hostname = hostname.into();
        InMemoryWorld {
            scheduler: RoundRobinScheduler::new(vec![hostname.clone()]),
            hostname,
            kv: MemoryKv::new(),
            exports: Mutex::new(Vec::new()),
            prefix,
            uri: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_peers(mut self, hosts: Vec<String>) -> Self {
        self.scheduler = RoundRobinScheduler::new(hosts);
        self
    }
}

#[async_trait]
impl World for InMemoryWorld {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn kv(&self) -> &dyn Kv {
        self.kv.as_ref()
    }

    fn kv_arc(&self) -> Arc<dyn Kv> {
        self.kv.clone()
    }

    async fn lease(&self, ttl: Duration) -> Result<Box<dyn Lease>, WorldError> {
        let _ = ttl;
        Ok(Box::new(MemoryLease::new()))
    }

    fn scheduler(&self) -> &dyn Scheduler {
        &self.scheduler
    }

    async fn res_export(&self, host: &str, resources: Vec<ExportedResource>) -> Result<(), WorldError> {
        let mut exports = self.exports.lock();
        exports.retain(|r| r.host != host);
        exports.extend(resources);
        Ok(())
    }

    async fn res_collect(&self, hosts: &[String], kinds: &[String]) -> Result<Vec<ExportedResource>, WorldError> {
        let exports = self.exports.lock();
        Ok(exports
            .iter()
            .filter(|r| hosts.is_empty() || hosts.contains(&r.host))
            .filter(|r| kinds.is_empty() || kinds.contains(&r.kind))
            .cloned()
            .collect())
    }

    fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }
}
