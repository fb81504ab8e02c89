//! An in-process implementation of the [`crate::Kv`] contract. Stands in for the embedded
//! cluster KV (etcd in the original design) whose lifecycle is out of scope (§1); this
//! gives every other crate in the workspace something real to Get/Put/Watch against,
//! including linearizable reads and a compare-and-swap the Deploy Bus's hash-chain
//! interlock (§4.8, §8's Deploy monotonicity property) depends on.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{Kv, Lease, WatchEvent, WorldError};

const WATCH_CHANNEL_CAPACITY: usize = 1024;

struct Inner {
    entries: BTreeMap<String, Vec<u8>>,
    rev: u64,
}

pub struct MemoryKv {
    inner: Mutex<Inner>,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryKv {
    pub fn new() -> Arc<Self> {
        let (events, _rx) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Arc::new(MemoryKv {
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                rev: 0,
            }),
            events,
        })
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WorldError> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        cas: Option<Option<Vec<u8>>>,
    ) -> Result<(), WorldError> {
        let mut inner = self.inner.lock();
        if let Some(expected) = &cas {
            let current = inner.entries.get(key);
            let matches = match expected {
                Some(expected_value) => current == Some(expected_value),
                None => current.is_none(),
            };
            if !matches {
                return Err(WorldError::CasConflict(key.to_string()));
            }
        }
        inner.entries.insert(key.to_string(), value.clone());
        inner.rev += 1;
        let rev = inner.rev;
        drop(inner);
        // A watch with no subscribers is a no-op send; that's fine, nobody is listening yet.
        let _ = self.events.send(WatchEvent::Put {
            key: key.to_string(),
            value,
            rev,
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), WorldError> {
        let mut inner = self.inner.lock();
        inner.entries.remove(key);
        inner.rev += 1;
        let rev = inner.rev;
        drop(inner);
        let _ = self.events.send(WatchEvent::Delete {
            key: key.to_string(),
            rev,
        });
        Ok(())
    }

    fn watch(&self, prefix: &str) -> broadcast::Receiver<WatchEvent> {
        // The broadcast channel itself is not prefix-filtered; callers that want a
        // prefix-scoped stream should filter by key. Kept simple since only the Deploy
        // Bus (watching `deploy/`) and tests exercise this today.
        let _ = prefix;
        self.events.subscribe()
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, WorldError> {
        Ok(self
            .inner
            .lock()
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

pub struct MemoryLease {
    id: u64,
    revoked: std::sync::atomic::AtomicBool,
}

static NEXT_LEASE_ID: AtomicU64 = AtomicU64::new(1);

impl MemoryLease {
    pub fn new() -> Self {
        MemoryLease {
            id: NEXT_LEASE_ID.fetch_add(1, Ordering::SeqCst),
            revoked: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Lease for MemoryLease {
    fn id(&self) -> u64 {
        self.id
    }

    async fn keep_alive(&self) -> Result<(), WorldError> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(WorldError::NoSuchLease(self.id));
        }
        Ok(())
    }

    async fn revoke(&self) -> Result<(), WorldError> {
        self.revoked.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let kv = MemoryKv::new();
        kv.put("a", b"1".to_vec(), None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn cas_rejects_mismatch() {
        let kv = MemoryKv::new();
        kv.put("a", b"1".to_vec(), None).await.unwrap();
        let result = kv.put("a", b"2".to_vec(), Some(Some(b"wrong".to_vec()))).await;
        assert_eq!(result, Err(WorldError::CasConflict("a".to_string())));
        assert_eq!(kv.get("a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn cas_accepts_matching_prev() {
        let kv = MemoryKv::new();
        kv.put("a", b"1".to_vec(), None).await.unwrap();
        kv.put("a", b"2".to_vec(), Some(Some(b"1".to_vec())))
            .await
            .unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn watch_observes_puts() {
        let kv = MemoryKv::new();
        let mut rx = kv.watch("");
        kv.put("a", b"1".to_vec(), None).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            WatchEvent::Put {
                key: "a".to_string(),
                value: b"1".to_vec(),
                rev: 1
            }
        );
    }

    #[tokio::test]
    async fn list_prefix_returns_only_matching_keys() {
        let kv = MemoryKv::new();
        kv.put("mgmt/reversal/file/a", b"pending".to_vec(), None).await.unwrap();
        kv.put("mgmt/reversal/file/b", b"pending".to_vec(), None).await.unwrap();
        kv.put("deploy/tip", b"1".to_vec(), None).await.unwrap();

        let mut listed = kv.list_prefix("mgmt/reversal/").await.unwrap();
        listed.sort();
        assert_eq!(
            listed,
            vec![
                ("mgmt/reversal/file/a".to_string(), b"pending".to_vec()),
                ("mgmt/reversal/file/b".to_string(), b"pending".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_cas_only_one_wins() {
        let kv = MemoryKv::new();
        kv.put("deploy/max", b"0".to_vec(), None).await.unwrap();
        let a = kv.put("deploy/max", b"1".to_vec(), Some(Some(b"0".to_vec())));
        let b = kv.put("deploy/max", b"1".to_vec(), Some(Some(b"0".to_vec())));
        let (ra, rb) = tokio::join!(a, b);
        assert!(ra.is_ok() ^ rb.is_ok());
    }
}
