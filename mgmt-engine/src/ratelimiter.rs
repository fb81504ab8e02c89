//! A per-resource token-bucket rate limiter (§4.4): `MetaParams.limit`/`burst` gate
//! admission to `checking`. Grounded in the standard token-bucket algorithm and kept
//! consistent with the rest of the crate's tokio-based concurrency model (see DESIGN.md).

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// `limit` is checks/sec; `None` disables the limiter entirely (§4.4's `Limit==+Inf`).
/// `Some(limit)` with `limit <= 0.0` is a distinct, deliberate case: it blocks forever,
/// the same "permanently unavailable" treatment §4.4 gives a semaphore of `n<=0`.
pub struct RateLimiter {
    limit: Option<f64>,
    burst: u32,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(limit: Option<f64>, burst: u32) -> Self {
        let burst = burst.max(1);
        RateLimiter {
            limit,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until a token is available, or forever if the limiter is configured to
    /// never admit (`limit <= 0.0`).
    pub async fn acquire(&self) {
        let Some(limit) = self.limit else { return };
        if limit <= 0.0 {
            std::future::pending::<()>().await;
            return;
        }
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * limit).min(self.burst as f64);
                bucket.last_refill = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / limit))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_limiter_never_blocks() {
        let limiter = RateLimiter::new(None, 1);
        tokio::time::timeout(Duration::from_millis(50), limiter.acquire())
            .await
            .expect("disabled limiter should return immediately");
    }

    #[tokio::test]
    async fn burst_allows_immediate_admission_up_to_capacity() {
        let limiter = RateLimiter::new(Some(100.0), 3);
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_millis(20), limiter.acquire())
                .await
                .expect("burst capacity should admit immediately");
        }
    }

    #[tokio::test]
    async fn zero_limit_blocks_forever() {
        let limiter = RateLimiter::new(Some(0.0), 1);
        let result = tokio::time::timeout(Duration::from_millis(30), limiter.acquire()).await;
        assert!(result.is_err());
    }
}
