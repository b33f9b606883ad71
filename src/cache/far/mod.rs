//! Far-tier adapter: a shared key/value store with per-key locks and
//! jittered TTLs.
//!
//! The facade addresses the far tier through canonical key strings; lock
//! keys are derived by prefixing. Two backends ship here: an in-process
//! [`MemoryFarCache`] and, behind the `redis` feature, a networked
//! [`RedisFarCache`].

pub mod error;
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use error::{FarCacheError, FarCacheResult};
pub use memory::MemoryFarCache;
#[cfg(feature = "redis")]
pub use redis::RedisFarCache;

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::config::{MAX_JITTER_PCT, MIN_JITTER_PCT};
use crate::entry::CacheEntry;

/// Prefix applied to a canonical key to name its single-flight lock.
pub const LOCK_PREFIX: &str = "lock:";

/// Outcome of an atomic get-plus-lock-attempt round trip.
///
/// The cached entry (if any) is returned regardless of whether the lock was
/// claimed, so a loser can serve slightly stale data instead of stampeding.
#[derive(Debug, Clone)]
pub struct LockAttempt<V> {
    pub value: Option<CacheEntry<V>>,
    pub acquired: bool,
    pub token: Option<String>,
}

impl<V> LockAttempt<V> {
    pub fn acquired(value: Option<CacheEntry<V>>, token: String) -> Self {
        Self {
            value,
            acquired: true,
            token: Some(token),
        }
    }

    pub fn not_acquired(value: Option<CacheEntry<V>>) -> Self {
        Self {
            value,
            acquired: false,
            token: None,
        }
    }
}

/// Shared far-tier store.
///
/// `get_with_lock` must be atomic on the store side (set-if-absent with
/// expiry), and `release_lock` must compare-and-delete in a single round
/// trip so a lock that expired and was re-acquired is never released by
/// the previous holder.
pub trait FarCache<V: Send + Sync>: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = FarCacheResult<Option<CacheEntry<V>>>> + Send;

    fn put(
        &self,
        key: &str,
        entry: &CacheEntry<V>,
        ttl: Duration,
    ) -> impl Future<Output = FarCacheResult<()>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = FarCacheResult<()>> + Send;

    fn get_with_lock(
        &self,
        key: &str,
        lock_timeout: Duration,
    ) -> impl Future<Output = FarCacheResult<LockAttempt<V>>> + Send;

    fn release_lock(
        &self,
        key: &str,
        token: &str,
    ) -> impl Future<Output = FarCacheResult<()>> + Send;

    /// Writes with a randomized effective TTL to spread out expiry.
    fn put_with_random_ttl(
        &self,
        key: &str,
        entry: &CacheEntry<V>,
        base_ttl: Duration,
        jitter_pct: u32,
    ) -> impl Future<Output = FarCacheResult<()>> + Send
    where
        Self: Sized,
    {
        let ttl = jittered_ttl(base_ttl, jitter_pct);
        async move {
            debug!(
                base_ttl_ms = base_ttl.as_millis() as u64,
                effective_ttl_ms = ttl.as_millis() as u64,
                "far-cache put with jitter"
            );
            self.put(key, entry, ttl).await
        }
    }

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// A fresh, unguessable lock token.
pub(crate) fn new_lock_token() -> String {
    let mut rng = rand::rng();
    format!("{:016x}{:016x}", rng.random::<u64>(), rng.random::<u64>())
}

/// Effective TTL = `base * (1 ± u)` with `u` uniform over the full
/// `[0.10, 0.30)` band and a fair-coin sign, floored at one second. The
/// percentage argument is clamped into `[10, 30]` but does not narrow the
/// band.
pub(crate) fn jittered_ttl(base: Duration, jitter_pct: u32) -> Duration {
    let clamped = jitter_pct.clamp(MIN_JITTER_PCT, MAX_JITTER_PCT);
    if clamped != jitter_pct {
        debug!(jitter_pct, clamped, "jitter percentage clamped into band");
    }

    let mut rng = rand::rng();
    let factor: f64 = rng.random_range(0.10..0.30);
    let increase: bool = rng.random();

    let base_secs = base.as_secs_f64();
    let jitter_secs = base_secs * factor;
    let effective = if increase {
        base_secs + jitter_secs
    } else {
        base_secs - jitter_secs
    };

    Duration::from_secs_f64(effective.max(1.0))
}
