//! Content-addressed verdict cache with single-flight deduplication.
//!
//! Memoizes completed verdicts by fingerprint with a TTL, bounded by LRU
//! eviction. The per-fingerprint mutex makes the check-then-compute
//! transition a critical section: for a given fingerprint, the first caller
//! that misses becomes the sole computer and every concurrent caller awaits
//! that computation's result instead of issuing duplicate upstream calls.

use crate::error::GatewayResult;
use lru::LruCache;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use vigil_common::Verdict;

struct CacheEntry {
    verdict: Verdict,
    expires_at: Instant,
}

/// One fingerprint's slot. Locking the slot serializes all callers for that
/// fingerprint without serializing unrelated fingerprints.
#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
}

/// TTL + LRU verdict cache with single-flight semantics
pub struct RequestCache {
    slots: Mutex<LruCache<String, Arc<Mutex<Slot>>>>,
}

impl RequestCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the cached verdict for `fingerprint` if fresh, otherwise let
    /// exactly one caller run `compute` and share its result.
    ///
    /// Failures are never cached: a failed computation releases the
    /// per-fingerprint lock so the next caller retries immediately.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &str,
        ttl: Duration,
        compute: F,
    ) -> GatewayResult<Verdict>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<Verdict>>,
    {
        // Outer lock held only long enough to fetch the slot handle
        let slot = {
            let mut slots = self.slots.lock().await;
            match slots.get(fingerprint) {
                Some(slot) => Arc::clone(slot),
                None => {
                    if slots.len() >= slots.cap().get() {
                        evict_idle_slot(&mut slots);
                    }
                    let slot = Arc::new(Mutex::new(Slot::default()));
                    slots.put(fingerprint.to_string(), Arc::clone(&slot));
                    slot
                }
            }
        };

        let mut slot = slot.lock().await;

        if let Some(entry) = &slot.entry {
            if Instant::now() < entry.expires_at {
                debug!(fingerprint, "cache hit");
                let mut verdict = entry.verdict.clone();
                verdict.from_cache = true;
                return Ok(verdict);
            }
            // Expired entries are treated as absent
            slot.entry = None;
        }

        debug!(fingerprint, "cache miss, computing");
        let verdict = compute().await?;

        slot.entry = Some(CacheEntry {
            verdict: verdict.clone(),
            expires_at: Instant::now() + ttl,
        });

        Ok(verdict)
    }

    /// Evict every entry; returns the number evicted.
    pub async fn clear(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let evicted = slots.len();
        slots.clear();
        evicted
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

/// Evict the least-recently-used slot that no caller currently holds.
///
/// A strong count above 1 means a computation (or waiter) still references
/// the slot; evicting it would let a second flight start for that
/// fingerprint. Pinned slots are rotated back in. If every slot is pinned
/// the subsequent `put` evicts one regardless, so exactly-once degrades only
/// when more computations are simultaneously in flight than the cache holds.
fn evict_idle_slot(slots: &mut LruCache<String, Arc<Mutex<Slot>>>) {
    for _ in 0..slots.len() {
        if let Some((key, slot)) = slots.pop_lru() {
            if Arc::strong_count(&slot) == 1 {
                return;
            }
            slots.put(key, slot);
        }
    }
}
