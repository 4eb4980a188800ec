//! Fixed-window rate limiting per client identity.
//!
//! Independent of the breaker and cache layers. The outer map lock is held
//! only to fetch a bucket handle; counting happens under the per-key lock so
//! unrelated clients never serialize on each other.

use crate::error::{GatewayError, GatewayResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// One client's window counter
struct RateBucket {
    window_start: Instant,
    count: u32,
}

/// Fixed-window request counter per client key
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<RateBucket>>>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            window,
            max_requests,
        }
    }

    /// Consume one unit of quota for `client_key`. Returns `RateLimited`
    /// once the window quota is exhausted; the counter resets when the
    /// window elapses.
    pub async fn consume(&self, client_key: &str) -> GatewayResult<()> {
        let bucket = self.bucket_handle(client_key).await;
        let mut bucket = bucket.lock().await;

        let now = Instant::now();
        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= self.max_requests {
            warn!(
                client = mask_key(client_key),
                count = bucket.count,
                quota = self.max_requests,
                "rate limit exceeded"
            );
            return Err(GatewayError::RateLimited {
                client_key: mask_key(client_key),
            });
        }

        bucket.count += 1;
        Ok(())
    }

    async fn bucket_handle(&self, client_key: &str) -> Arc<Mutex<RateBucket>> {
        {
            let buckets = self.buckets.read().await;
            if let Some(bucket) = buckets.get(client_key) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().await;
        Arc::clone(buckets.entry(client_key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(RateBucket {
                window_start: Instant::now(),
                count: 0,
            }))
        }))
    }

    /// Drop buckets whose window elapsed (called periodically).
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;

        let before = buckets.len();
        let mut stale = Vec::new();
        for (key, bucket) in buckets.iter() {
            if let Ok(bucket) = bucket.try_lock() {
                if now.duration_since(bucket.window_start) >= self.window {
                    stale.push(key.clone());
                }
            }
        }
        for key in stale {
            buckets.remove(&key);
        }

        debug!(
            before,
            after = buckets.len(),
            "rate limiter cleanup complete"
        );
    }

    pub async fn active_clients(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// Mask client keys for logging (they may be auth tokens).
fn mask_key(key: &str) -> String {
    if key.len() > 8 {
        format!("{}...", &key[..8])
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quota_plus_one_is_rejected() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 5);

        for i in 1..=5 {
            assert!(
                limiter.consume("client-a").await.is_ok(),
                "request {} should be within quota",
                i
            );
        }

        let rejected = limiter.consume("client-a").await;
        assert!(matches!(rejected, Err(GatewayError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);

        assert!(limiter.consume("client-a").await.is_ok());
        assert!(limiter.consume("client-a").await.is_err());

        // A different client still has quota
        assert!(limiter.consume("client-b").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_reset_restores_quota() {
        let limiter = RateLimiter::new(Duration::from_millis(30), 1);

        assert!(limiter.consume("client-a").await.is_ok());
        assert!(limiter.consume("client-a").await.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(limiter.consume("client-a").await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_buckets() {
        let limiter = RateLimiter::new(Duration::from_millis(20), 10);

        limiter.consume("client-a").await.unwrap();
        limiter.consume("client-b").await.unwrap();
        assert_eq!(limiter.active_clients().await, 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.active_clients().await, 0);
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("short"), "***");
        assert_eq!(mask_key("1234567890abcdef"), "12345678...");
    }
}
