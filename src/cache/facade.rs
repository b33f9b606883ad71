//! The cache facade: two-tier read-through/write-through orchestration
//! with the four mass-miss protections.
//!
//! Read path: hot-key tick, membership filter, near tier, far tier (with
//! near refill), then either single flight (hot keys) or a direct load
//! through the breaker. Writes go through both tiers plus the filter;
//! invalidation is a delayed double delete.
//!
//! No public method here returns an error: tier trouble degrades to a miss
//! and loader trouble is absorbed by retry, breaker, and fallback.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::far::{FarCache, LockAttempt};
use super::near::{NearCache, NearCacheStats};
use crate::breaker::CircuitBreaker;
use crate::config::{CacheConfig, ConfigError};
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::filter::KeyFilter;
use crate::hotkey::HotKeyDetector;
use crate::metrics::CacheMetrics;
use crate::retry::RetryExecutor;
use crate::types::{CacheEventType, CacheLevel, CacheOperation, CircuitState};

/// Back-off before the single lost-lock re-read of the far tier.
const LOCK_LOSER_BACKOFF: Duration = Duration::from_millis(50);

/// Gap between the two deletes of an invalidation. Sized to outlast
/// typical replication/commit latency; not tunable.
const DOUBLE_DELETE_DELAY: Duration = Duration::from_millis(500);

/// Grace given to in-flight delayed deletes during `close`.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Keys usable by the facade.
///
/// The `Display` rendering is the canonical string used for the membership
/// filter, hot-key tracking, far-tier addressing, and lock naming; it must
/// be injective over the key population.
pub trait CacheKey: Clone + Eq + std::hash::Hash + std::fmt::Display + Send + Sync + 'static {}

impl<K> CacheKey for K where
    K: Clone + Eq + std::hash::Hash + std::fmt::Display + Send + Sync + 'static
{
}

/// Authoritative data source behind both tiers.
///
/// `Ok(None)` means the key has no record; any error is accounted as a
/// data-source failure against the breaker.
pub trait DataLoader<K, V>: Send + Sync {
    fn load(
        &self,
        key: &K,
    ) -> impl Future<Output = Result<Option<V>, Box<dyn std::error::Error + Send + Sync>>> + Send;
}

struct FacadeInner<K, V, F, L>
where
    K: CacheKey,
    V: Clone + Send + Sync + 'static,
    F: FarCache<V>,
    L: DataLoader<K, V>,
{
    near: NearCache<K, V>,
    far: F,
    loader: L,
    filter: KeyFilter,
    hot_keys: HotKeyDetector,
    breaker: CircuitBreaker,
    metrics: CacheMetrics,
    retry: RetryExecutor,
    config: CacheConfig,
    delayed_deletes: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

/// Two-tier read-through cache facade. Cheap to clone; all clones share
/// the same tiers, protections, and scheduler.
pub struct CacheFacade<K, V, F, L>
where
    K: CacheKey,
    V: Clone + Send + Sync + 'static,
    F: FarCache<V>,
    L: DataLoader<K, V>,
{
    inner: Arc<FacadeInner<K, V, F, L>>,
}

impl<K, V, F, L> Clone for CacheFacade<K, V, F, L>
where
    K: CacheKey,
    V: Clone + Send + Sync + 'static,
    F: FarCache<V>,
    L: DataLoader<K, V>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, F, L> CacheFacade<K, V, F, L>
where
    K: CacheKey,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: FarCache<V> + 'static,
    L: DataLoader<K, V> + 'static,
{
    /// Validates the configuration and wires up every subsystem.
    pub fn new(config: CacheConfig, far: F, loader: L) -> Result<Self, ConfigError> {
        config.validate()?;

        let facade = Self {
            inner: Arc::new(FacadeInner {
                near: NearCache::new(config.near.clone()),
                far,
                loader,
                filter: KeyFilter::new(config.filter.clone()),
                hot_keys: HotKeyDetector::new(config.hot_key.clone()),
                breaker: CircuitBreaker::new(config.breaker.clone()),
                metrics: CacheMetrics::new(),
                retry: RetryExecutor::new(config.retry.clone()),
                config,
                delayed_deletes: Mutex::new(JoinSet::new()),
                closed: AtomicBool::new(false),
            }),
        };
        info!("cache facade initialized");
        Ok(facade)
    }

    /// Reads a value, filling tiers on the way back up. Absent when the
    /// key does not exist, is negatively cached, or every layer degraded.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn get(&self, key: &K) -> Option<V> {
        let start = Instant::now();
        let result = self.get_inner(key).await;
        self.inner
            .metrics
            .record_latency(CacheOperation::Get, start.elapsed());
        result
    }

    async fn get_inner(&self, key: &K) -> Option<V> {
        let inner = &self.inner;
        let key_str = key.to_string();

        inner.hot_keys.record_access(&key_str);

        // Sole fast-path rejection; consults neither tier.
        if !inner.filter.might_contain(&key_str) {
            debug!("key not in membership filter");
            inner.metrics.record_event(CacheEventType::Penetration);
            return None;
        }

        if let Some(entry) = inner.near.get(key) {
            if !entry.is_stale() {
                inner.metrics.record_hit(CacheLevel::L1Near);
                debug!("near-tier hit");
                return entry.into_value();
            }
        }
        inner.metrics.record_miss(CacheLevel::L1Near);

        match inner.far.get(&key_str).await {
            Ok(Some(entry)) if !entry.is_stale() => {
                inner
                    .near
                    .put(key.clone(), entry.clone(), inner.config.near.default_ttl);
                inner.metrics.record_hit(CacheLevel::L2Far);
                debug!("far-tier hit, refilled near tier");
                return entry.into_value();
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "far-tier read failed, treating as miss");
            }
        }
        inner.metrics.record_miss(CacheLevel::L2Far);

        if inner.hot_keys.is_hot(&key_str) {
            self.load_with_lock(key, &key_str).await
        } else {
            self.load_from_source(key).await
        }
    }

    /// Single-flight branch: both tiers missed on a hot key.
    async fn load_with_lock(&self, key: &K, key_str: &str) -> Option<V> {
        let inner = &self.inner;

        let attempt: LockAttempt<V> = match inner
            .far
            .get_with_lock(key_str, inner.config.far.lock_timeout)
            .await
        {
            Ok(attempt) => attempt,
            Err(err) => {
                // Treated as "not acquired, no cached value": absent beats
                // stampeding past the lock.
                warn!(error = %err, "lock round trip failed");
                return None;
            }
        };

        if attempt.acquired {
            inner.metrics.record_event(CacheEventType::Breakdown);
            debug!("single-flight lock acquired");
            let result = self.load_from_source(key).await;

            if let Some(token) = attempt.token {
                if let Err(err) = inner.far.release_lock(key_str, &token).await {
                    warn!(error = %err, "lock release failed, will expire on its own");
                }
            }
            result
        } else {
            if let Some(entry) = attempt.value {
                if !entry.is_stale() {
                    debug!("lost the lock, serving piggy-backed entry");
                    return entry.into_value();
                }
            }

            tokio::time::sleep(LOCK_LOSER_BACKOFF).await;
            match inner.far.get(key_str).await {
                Ok(Some(entry)) if !entry.is_stale() => {
                    debug!("lost the lock, far tier filled while waiting");
                    entry.into_value()
                }
                Ok(_) => None,
                Err(err) => {
                    warn!(error = %err, "far-tier re-read failed after lost lock");
                    None
                }
            }
        }
    }

    /// Direct-load branch: the loader runs under retry inside the breaker.
    async fn load_from_source(&self, key: &K) -> Option<V> {
        let this = self;
        let inner = &*self.inner;

        inner
            .breaker
            .execute(
                move || async move {
                    let loader = &inner.loader;
                    let loaded = inner
                        .retry
                        .execute(move || async move {
                            loader
                                .load(key)
                                .await
                                .map_err(|e| CacheError::DataSource(e.to_string()))
                        })
                        .await?;

                    match loaded {
                        Some(value) => {
                            this.put(key, value.clone(), None).await;
                            Ok(Some(value))
                        }
                        None => {
                            if inner.config.negative.enabled {
                                this.cache_negative(key).await;
                            }
                            Ok(None)
                        }
                    }
                },
                move || async move {
                    warn!("data-source load fell back to absent");
                    if inner.breaker.state() == CircuitState::Open {
                        inner.metrics.record_event(CacheEventType::CircuitOpen);
                    }
                    None
                },
            )
            .await
    }

    /// Writes a negative entry to both tiers. The filter is left alone so
    /// genuinely absent keys keep being rejected once the entry lapses.
    async fn cache_negative(&self, key: &K) {
        let inner = &self.inner;
        let expires_at = SystemTime::now() + inner.config.negative.ttl;
        let entry: CacheEntry<V> = CacheEntry::negative(expires_at);

        inner
            .near
            .put(key.clone(), entry.clone(), inner.config.negative.ttl);
        let key_str = key.to_string();
        if let Err(err) = inner
            .far
            .put(&key_str, &entry, inner.config.negative.ttl)
            .await
        {
            warn!(error = %err, "far-tier negative put failed");
        }
        debug!("negative entry cached");
    }

    /// Writes through both tiers and the filter. `ttl` defaults to the far
    /// tier's default; the near tier caps at its own write-TTL either way.
    #[instrument(skip(self, key, value), fields(key = %key))]
    pub async fn put(&self, key: &K, value: V, ttl: Option<Duration>) {
        let start = Instant::now();
        let inner = &self.inner;

        let key_str = key.to_string();
        let effective_ttl = ttl.unwrap_or(inner.config.far.default_ttl);
        let entry = CacheEntry::new(
            value,
            SystemTime::now() + effective_ttl,
            inner.hot_keys.is_hot(&key_str),
        );

        inner
            .near
            .put(key.clone(), entry.clone(), inner.config.near.default_ttl);

        if let Err(err) = inner
            .far
            .put_with_random_ttl(
                &key_str,
                &entry,
                effective_ttl,
                inner.config.far.ttl_jitter_pct,
            )
            .await
        {
            warn!(error = %err, "far-tier put failed, near tier still updated");
        }

        inner.filter.insert(&key_str);
        debug!(ttl_ms = effective_ttl.as_millis() as u64, "cache put");

        inner
            .metrics
            .record_latency(CacheOperation::Put, start.elapsed());
    }

    /// Removes the key from both tiers. Idempotent.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn delete(&self, key: &K) {
        let start = Instant::now();
        self.delete_inner(key).await;
        self.inner
            .metrics
            .record_latency(CacheOperation::Delete, start.elapsed());
    }

    async fn delete_inner(&self, key: &K) {
        let inner = &self.inner;
        inner.near.delete(key);
        if let Err(err) = inner.far.delete(&key.to_string()).await {
            warn!(error = %err, "far-tier delete failed");
        }
        debug!("cache delete");
    }

    /// Serial composition of `get`; absent keys are omitted.
    pub async fn multi_get(&self, keys: &[K]) -> HashMap<K, V> {
        let mut results = HashMap::new();
        for key in keys {
            if let Some(value) = self.get(key).await {
                results.insert(key.clone(), value);
            }
        }
        results
    }

    /// Serial composition of `put`.
    pub async fn multi_put(&self, entries: HashMap<K, V>, ttl: Option<Duration>) {
        for (key, value) in entries {
            self.put(&key, value, ttl).await;
        }
    }

    /// Delete now, then delete again after a fixed delay, closing the
    /// window where a concurrent reader repopulates pre-commit state.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn invalidate(&self, key: &K) {
        self.delete(key).await;

        if self.inner.closed.load(Ordering::Acquire) {
            debug!("facade closed, skipping delayed delete");
            return;
        }

        let facade = self.clone();
        let key = key.clone();
        let mut tasks = self.inner.delayed_deletes.lock().await;
        // Reap finished deletes so the set does not grow unbounded.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            tokio::time::sleep(DOUBLE_DELETE_DELAY).await;
            facade.delete(&key).await;
            debug!(key = %key, "delayed delete executed");
        });
        debug!("invalidate scheduled delayed delete");
    }

    /// Drains the delayed-delete scheduler (bounded grace), then closes the
    /// far tier. Safe to call more than once.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut tasks = self.inner.delayed_deletes.lock().await;
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(CLOSE_GRACE, drain).await.is_err() {
            warn!("delayed deletes outlived the close grace, aborting");
            tasks.abort_all();
        }
        drop(tasks);

        self.inner.far.close().await;
        info!("cache facade closed");
    }

    /// The membership filter, for operator warm-up and rebuilds.
    pub fn filter(&self) -> &KeyFilter {
        &self.inner.filter
    }

    /// The hot-key detector, for inspection and reconfiguration.
    pub fn hot_keys(&self) -> &HotKeyDetector {
        &self.inner.hot_keys
    }

    /// The breaker guarding the data source.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// The metrics recorder.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.inner.metrics
    }

    /// Near-tier statistics.
    pub fn near_stats(&self) -> NearCacheStats {
        self.inner.near.stats()
    }

    /// Flushes the near engine's pending maintenance. Test and diagnostics
    /// helper.
    pub fn run_pending_near_tasks(&self) {
        self.inner.near.run_pending_tasks();
    }
}

impl<K, V, F, L> std::fmt::Debug for CacheFacade<K, V, F, L>
where
    K: CacheKey,
    V: Clone + Send + Sync + 'static,
    F: FarCache<V>,
    L: DataLoader<K, V>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFacade")
            .field("near", &self.inner.near)
            .field("breaker", &self.inner.breaker)
            .field("strong_count", &Arc::strong_count(&self.inner))
            .finish()
    }
}
