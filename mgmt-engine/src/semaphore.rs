//! Named semaphores (§4.4): the engine keeps exactly one process-wide counting semaphore
//! per distinct [`SemaToken`] id, so two resources naming the same id actually contend
//! for the same `n` permits. Anonymous tokens (`id: None`) get a fresh semaphore scoped
//! to the one acquisition, matching their "local to this resource" semantics.

use std::collections::HashMap;
use std::sync::Arc;

use mgmt_resource::SemaToken;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// `n<=0` is treated as "permanently unavailable": a zero-permit semaphore, so every
/// acquire blocks forever rather than erroring (§4.4).
fn capacity_of(n: i64) -> usize {
    if n <= 0 {
        0
    } else {
        n as usize
    }
}

#[derive(Default)]
pub struct SemaphoreRegistry {
    named: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SemaphoreRegistry {
    pub fn new() -> Self {
        SemaphoreRegistry::default()
    }

    fn named_semaphore(&self, id: &str, n: i64) -> Arc<Semaphore> {
        let mut named = self.named.lock();
        named
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(capacity_of(n))))
            .clone()
    }

    /// Acquires every token in `tokens`, which must already be in §4.4's fixed global
    /// order (see [`mgmt_resource::MetaParams::ordered_sema`]), and returns the held
    /// permits. Dropping the returned `Vec` releases them.
    pub async fn acquire_all(&self, tokens: &[SemaToken]) -> Vec<OwnedSemaphorePermit> {
        let mut permits = Vec::with_capacity(tokens.len());
        for token in tokens {
            let sem = match &token.id {
                Some(id) => self.named_semaphore(id, token.n),
                None => Arc::new(Semaphore::new(capacity_of(token.n))),
            };
            match sem.acquire_owned().await {
                Ok(permit) => permits.push(permit),
                Err(_) => unreachable!("semaphore is never closed"),
            }
        }
        permits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_tokens_with_the_same_id_share_capacity() {
        let registry = SemaphoreRegistry::new();
        let first = registry.acquire_all(&[SemaToken::named("net", 1)]).await;
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(30),
            registry.acquire_all(&[SemaToken::named("net", 1)]),
        )
        .await;
        assert!(second.is_err(), "second acquire should block while the first permit is held");
        drop(first);
    }

    #[tokio::test]
    async fn zero_capacity_blocks_forever() {
        let registry = SemaphoreRegistry::new();
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(30),
            registry.acquire_all(&[SemaToken::named("locked", 0)]),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn anonymous_tokens_do_not_contend_across_calls() {
        let registry = SemaphoreRegistry::new();
        let a = registry.acquire_all(&[SemaToken::anonymous(1)]).await;
        let b = tokio::time::timeout(
            std::time::Duration::from_millis(30),
            registry.acquire_all(&[SemaToken::anonymous(1)]),
        )
        .await;
        assert!(b.is_ok(), "anonymous tokens get their own semaphore per call");
        drop(a);
    }
}
