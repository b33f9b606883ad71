//! Near-tier adapter: a bounded, TTL-expiring in-process store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::sync::Cache;
use tracing::{debug, info};

use crate::config::NearCacheConfig;
use crate::entry::CacheEntry;

/// Hit/miss/eviction counts for the near tier.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NearCacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub eviction_count: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Bounded near cache holding [`CacheEntry`] values under the engine's
/// write-TTL.
pub struct NearCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Cache<K, CacheEntry<V>>,
    counters: Arc<Counters>,
    record_stats: bool,
}

impl<K, V> NearCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: NearCacheConfig) -> Self {
        let counters = Arc::new(Counters::default());
        let listener_counters = Arc::clone(&counters);

        let entries = Cache::builder()
            .max_capacity(config.max_size)
            .time_to_live(config.default_ttl)
            .eviction_listener(move |_key, _value, cause| {
                debug!(?cause, "near-cache entry removed");
                listener_counters.evictions.fetch_add(1, Ordering::Relaxed);
            })
            .build();

        info!(
            max_size = config.max_size,
            default_ttl_ms = config.default_ttl.as_millis() as u64,
            record_stats = config.record_stats,
            "near cache initialized"
        );

        Self {
            entries,
            counters,
            record_stats: config.record_stats,
        }
    }

    #[inline]
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        let found = self.entries.get(key);
        if self.record_stats {
            match found {
                Some(_) => self.counters.hits.fetch_add(1, Ordering::Relaxed),
                None => self.counters.misses.fetch_add(1, Ordering::Relaxed),
            };
        }
        found
    }

    /// Stores an entry. The per-call `_ttl` is not consulted: the engine
    /// enforces its configured write-TTL for every entry.
    // TODO: honor per-call TTL via moka's Expiry policy.
    #[inline]
    pub fn put(&self, key: K, entry: CacheEntry<V>, _ttl: std::time::Duration) {
        self.entries.insert(key, entry);
    }

    #[inline]
    pub fn delete(&self, key: &K) {
        self.entries.invalidate(key);
    }

    #[inline]
    pub fn clear(&self) {
        self.entries.invalidate_all();
        info!("near cache cleared");
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Flushes the engine's pending maintenance so `size` and eviction
    /// counts are current. Test and diagnostics helper.
    #[inline]
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    pub fn stats(&self) -> NearCacheStats {
        if !self.record_stats {
            return NearCacheStats::default();
        }
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        NearCacheStats {
            hit_count: hits,
            miss_count: misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            eviction_count: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> std::fmt::Debug for NearCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NearCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
