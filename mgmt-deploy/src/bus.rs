//! The Deploy Bus (§4.8): deploys live under `deploy/<id>` keys in the world KV, with a
//! `deploy/tip` pointer carrying the hash-chain interlock. `id`s strictly increase; a put
//! only succeeds if the caller's `prev_hash` matches the tip's hash, unless forced.

use std::hash::Hasher;
use std::sync::Arc;

use fnv::FnvHasher;
use mgmt_world::{Kv, WatchEvent, WorldError};
use serde_derive::{Deserialize, Serialize};

use crate::deploy::Deploy;

const DEPLOY_PREFIX: &str = "deploy/";
const TIP_KEY: &str = "deploy/tip";

fn deploy_key(id: u64) -> String {
    format!("{DEPLOY_PREFIX}{id}")
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    #[error("hash chain conflict: expected prev_hash {expected}, tip is {actual}")]
    HashChainConflict { expected: u64, actual: u64 },
    #[error("deploy id {0} already exists")]
    DuplicateId(u64),
    #[error("no deploy with id {0}")]
    NotFound(u64),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("failed to encode deploy record: {0}")]
    Encode(String),
    #[error("failed to decode deploy record: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredDeploy {
    deploy: Deploy,
    hash: u64,
    prev_hash: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct Tip {
    id: u64,
    hash: u64,
}

/// Computes the next link of the chain: a non-cryptographic hash of `prev_hash` folded
/// with the bincode encoding of `deploy`. Good enough for a tamper-evident ordering
/// interlock between trusted cluster peers; not a security boundary (§1 places PGP
/// identity and consensus out of scope).
fn chain_hash(prev_hash: u64, deploy: &Deploy) -> Result<u64, DeployError> {
    let encoded = bincode::serialize(deploy).map_err(|e| DeployError::Encode(e.to_string()))?;
    let mut hasher = FnvHasher::default();
    hasher.write_u64(prev_hash);
    hasher.write(&encoded);
    Ok(hasher.finish())
}

pub struct DeployBus {
    kv: Arc<dyn Kv>,
}

impl DeployBus {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        DeployBus { kv }
    }

    /// The hash chain's genesis value, used as `prev_hash` for the very first deploy.
    pub fn genesis_hash() -> u64 {
        0
    }

    async fn read_tip(&self) -> Result<Option<Tip>, DeployError> {
        match self.kv.get(TIP_KEY).await? {
            Some(bytes) => {
                let tip: Tip = bincode::deserialize(&bytes).map_err(|e| DeployError::Decode(e.to_string()))?;
                Ok(Some(tip))
            }
            None => Ok(None),
        }
    }

    pub async fn get_max_deploy_id(&self) -> Result<u64, DeployError> {
        Ok(self.read_tip().await?.map(|t| t.id).unwrap_or(0))
    }

    /// Appends `deploy` to the chain. `prev_hash` must equal the current tip's hash (or
    /// [`DeployBus::genesis_hash`] if the chain is empty) unless `force` is set, matching
    /// §4.8's "`AddDeploy` must fail if `prevHash` does not match the latest committed
    /// record, unless forced". Returns the new tip hash.
    pub async fn add_deploy(&self, deploy: Deploy, prev_hash: u64, force: bool) -> Result<u64, DeployError> {
        let tip = self.read_tip().await?;
        let tip_bytes = match &tip {
            Some(t) => Some(bincode::serialize(t).map_err(|e| DeployError::Encode(e.to_string()))?),
            None => None,
        };

        if !force {
            let actual = tip.map(|t| t.hash).unwrap_or(Self::genesis_hash());
            if actual != prev_hash {
                return Err(DeployError::HashChainConflict {
                    expected: prev_hash,
                    actual,
                });
            }
        }

        let hash = chain_hash(prev_hash, &deploy)?;
        let id = deploy.id;
        let record = StoredDeploy {
            deploy,
            hash,
            prev_hash,
        };
        let encoded = bincode::serialize(&record).map_err(|e| DeployError::Encode(e.to_string()))?;

        // Guard against a reused id independently of the tip CAS — a caller computing ids
        // from a stale max-id read should fail loudly rather than silently overwrite.
        self.kv
            .put(&deploy_key(id), encoded, Some(None))
            .await
            .map_err(|e| match e {
                WorldError::CasConflict(_) => DeployError::DuplicateId(id),
                other => DeployError::World(other),
            })?;

        let new_tip = Tip { id, hash };
        let new_tip_bytes = bincode::serialize(&new_tip).map_err(|e| DeployError::Encode(e.to_string()))?;
        let cas = if force { None } else { Some(tip_bytes) };
        self.kv.put(TIP_KEY, new_tip_bytes, cas).await?;

        Ok(hash)
    }

    pub async fn get_deploy(&self, id: u64) -> Result<Option<Deploy>, DeployError> {
        match self.kv.get(&deploy_key(id)).await? {
            Some(bytes) => {
                let record: StoredDeploy =
                    bincode::deserialize(&bytes).map_err(|e| DeployError::Decode(e.to_string()))?;
                Ok(Some(record.deploy))
            }
            None => Ok(None),
        }
    }

    /// A stream of "activity" events (§4.8): any put/delete under `deploy/`. Consumers
    /// must re-poll `get_max_deploy_id` on receipt rather than trust the event payload,
    /// matching [`mgmt_world::Kv::watch`]'s documented contract.
    pub fn watch_deploy(&self) -> tokio::sync::broadcast::Receiver<WatchEvent> {
        self.kv.watch(DEPLOY_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgmt_world::kv::MemoryKv;

    fn sample(id: u64) -> Deploy {
        Deploy {
            id,
            name: "static".to_string(),
            noop: false,
            sema: 0,
            payload: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn first_deploy_requires_genesis_prev_hash() {
        let bus = DeployBus::new(MemoryKv::new());
        let hash = bus.add_deploy(sample(1), DeployBus::genesis_hash(), false).await.unwrap();
        assert_ne!(hash, 0);
        assert_eq!(bus.get_max_deploy_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_stale_prev_hash() {
        let bus = DeployBus::new(MemoryKv::new());
        bus.add_deploy(sample(1), DeployBus::genesis_hash(), false).await.unwrap();
        let err = bus.add_deploy(sample(2), DeployBus::genesis_hash(), false).await.unwrap_err();
        assert!(matches!(err, DeployError::HashChainConflict { .. }));
    }

    #[tokio::test]
    async fn forced_add_bypasses_chain_check() {
        let bus = DeployBus::new(MemoryKv::new());
        bus.add_deploy(sample(1), DeployBus::genesis_hash(), false).await.unwrap();
        let result = bus.add_deploy(sample(2), 0xDEAD, true).await;
        assert!(result.is_ok());
        assert_eq!(bus.get_max_deploy_id().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn get_deploy_round_trips() {
        let bus = DeployBus::new(MemoryKv::new());
        bus.add_deploy(sample(1), DeployBus::genesis_hash(), false).await.unwrap();
        let fetched = bus.get_deploy(1).await.unwrap().unwrap();
        assert_eq!(fetched, sample(1));
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let bus = DeployBus::new(MemoryKv::new());
        let hash1 = bus.add_deploy(sample(1), DeployBus::genesis_hash(), false).await.unwrap();
        let err = bus.add_deploy(sample(1), hash1, false).await.unwrap_err();
        assert!(matches!(err, DeployError::DuplicateId(1)));
    }

    #[tokio::test]
    async fn watch_fires_on_add_deploy() {
        let bus = DeployBus::new(MemoryKv::new());
        let mut rx = bus.watch_deploy();
        bus.add_deploy(sample(1), DeployBus::genesis_hash(), false).await.unwrap();
        assert!(rx.recv().await.is_ok());
    }
}
