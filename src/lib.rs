//! Strata: a two-tier read-through cache.
//!
//! A process-local near tier (bounded, TTL-expiring) composed with a
//! shared far tier (networked key/value), coordinated by a facade that
//! carries the four classic protections against mass-miss pathologies:
//!
//! - **Penetration**: an approximate-membership filter rejects lookups for
//!   keys that were never written, before either tier is consulted.
//! - **Avalanche**: far-tier TTLs are jittered so bulk expiry spreads out.
//! - **Breakdown**: a sliding-window detector classifies hot keys and
//!   collapses their concurrent misses through a distributed lock.
//! - **Downstream failure**: the data-source call runs under retry and a
//!   circuit breaker; a tripped breaker degrades reads to absent.
//!
//! # Public API Surface
//!
//! ## Core
//! - [`CacheFacade`] - the read/write/invalidate orchestrator
//! - [`CacheKey`], [`DataLoader`] - caller-supplied key and loader contracts
//! - [`CacheConfig`], [`ConfigError`] - construction-time configuration
//! - [`CacheEntry`] - the versioned value wrapper both tiers store
//!
//! ## Tiers
//! - [`NearCache`], [`NearCacheStats`] - in-process tier adapter
//! - [`FarCache`], [`LockAttempt`], [`MemoryFarCache`] - shared tier;
//!   `RedisFarCache` behind the `redis` feature
//!
//! ## Protections
//! - [`KeyFilter`], [`FilterStats`] - membership filter
//! - [`HotKeyDetector`] - sliding-window hot-key detection
//! - [`CircuitBreaker`], [`BreakerStats`] - data-source failure guard
//! - [`RetryExecutor`], [`ErrorDisposition`] - back-off policy
//!
//! ## Observability
//! - [`CacheMetrics`], [`MetricsSnapshot`] - counters and text exposition
//! - [`CacheLevel`], [`CacheOperation`], [`CacheEventType`],
//!   [`CircuitState`] - the tags those counters are keyed by

pub mod breaker;
pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod hotkey;
pub mod metrics;
pub mod retry;
pub mod types;

pub use breaker::{BreakerStats, CircuitBreaker};
pub use cache::{
    CacheFacade, CacheKey, DataLoader, FarCache, FarCacheError, FarCacheResult, LockAttempt,
    MemoryFarCache, NearCache, NearCacheStats,
};
#[cfg(feature = "redis")]
pub use cache::RedisFarCache;
pub use config::{
    BreakerConfig, CacheConfig, ConfigError, FarCacheConfig, FilterConfig, HotKeyConfig,
    NearCacheConfig, NegativeCacheConfig, RetryConfig,
};
pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult, ErrorKind};
pub use filter::{FilterStats, KeyFilter};
pub use hotkey::HotKeyDetector;
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use retry::{ErrorDisposition, RetryExecutor};
pub use types::{CacheEventType, CacheLevel, CacheOperation, CircuitState};
