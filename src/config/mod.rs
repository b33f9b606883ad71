//! Cache system configuration.
//!
//! A [`CacheConfig`] is built once, validated, and handed to the facade at
//! construction; it is immutable afterwards (hot-key threshold and window
//! can later be changed through the detector's `reconfigure`).

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::collections::HashSet;
use std::time::Duration;

use crate::error::ErrorKind;

/// Near-tier (process-local) settings.
#[derive(Debug, Clone)]
pub struct NearCacheConfig {
    /// Max entries held by the near tier. Default: `10_000`.
    pub max_size: u64,

    /// Write-TTL enforced by the near engine. Default: `60 s`.
    pub default_ttl: Duration,

    /// Whether the adapter counts its own hits/misses. Default: `true`.
    pub record_stats: bool,
}

impl Default for NearCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            default_ttl: Duration::from_secs(60),
            record_stats: true,
        }
    }
}

/// Far-tier (shared, networked) settings.
#[derive(Debug, Clone)]
pub struct FarCacheConfig {
    /// Base TTL for far-tier writes. Default: `300 s`.
    pub default_ttl: Duration,

    /// Jitter percentage, clamped into `[10, 30]`. Default: `20`.
    pub ttl_jitter_pct: u32,

    /// Wait limit and auto-release TTL for the per-key lock. Default: `3 s`.
    pub lock_timeout: Duration,
}

impl Default for FarCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            ttl_jitter_pct: 20,
            lock_timeout: Duration::from_secs(3),
        }
    }
}

/// Membership-filter sizing and monitoring.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Insertions the filter is sized for. Default: `100_000`.
    pub expected_insertions: u64,

    /// Target false-positive rate, in `(0, 1)`. Default: `0.01`.
    pub false_positive_rate: f64,

    /// Estimated-fp-rate level that triggers a rebuild warning. Default: `0.05`.
    pub rebuild_threshold: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            expected_insertions: 100_000,
            false_positive_rate: 0.01,
            rebuild_threshold: 0.05,
        }
    }
}

/// Negative (null-value) caching.
#[derive(Debug, Clone)]
pub struct NegativeCacheConfig {
    /// Whether loader misses are cached as negative entries. Default: `true`.
    pub enabled: bool,

    /// Negative-entry TTL, at most five minutes. Default: `5 min`.
    pub ttl: Duration,
}

impl Default for NegativeCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Sliding-window hot-key detection.
#[derive(Debug, Clone)]
pub struct HotKeyConfig {
    /// Whether detection runs at all. Default: `true`.
    pub enabled: bool,

    /// Accesses within the window that make a key hot. Default: `100`.
    pub threshold: u32,

    /// Window width. Default: `60 s`.
    pub window: Duration,
}

impl Default for HotKeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker around the data-source call.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Whether the breaker guards loads. Default: `true`.
    pub enabled: bool,

    /// Consecutive failures that trip the breaker. Default: `5`.
    pub failure_threshold: u32,

    /// Time in Open before a probe is allowed. Default: `30 s`.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Retry policy for classified-retryable failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first. Default: `3`.
    pub max_attempts: u32,

    /// Delay before the second attempt. Default: `100 ms`.
    pub initial_delay: Duration,

    /// Back-off ceiling. Default: `5 s`.
    pub max_delay: Duration,

    /// Exponential back-off factor. Default: `2.0`.
    pub backoff_multiplier: f64,

    /// Kinds eligible for retry. Default: far-cache connection, far-cache
    /// timeout, data source.
    pub retryable_errors: HashSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            retryable_errors: ErrorKind::default_retryable(),
        }
    }
}

/// Aggregate configuration for the whole cache system.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub near: NearCacheConfig,
    pub far: FarCacheConfig,
    pub filter: FilterConfig,
    pub negative: NegativeCacheConfig,
    pub hot_key: HotKeyConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
}

const NEGATIVE_TTL_CEILING: Duration = Duration::from_secs(300);

pub(crate) const MIN_JITTER_PCT: u32 = 10;
pub(crate) const MAX_JITTER_PCT: u32 = 30;

impl CacheConfig {
    pub fn near(mut self, near: NearCacheConfig) -> Self {
        self.near = near;
        self
    }

    pub fn far(mut self, far: FarCacheConfig) -> Self {
        self.far = far;
        self
    }

    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn negative(mut self, negative: NegativeCacheConfig) -> Self {
        self.negative = negative;
        self
    }

    pub fn hot_key(mut self, hot_key: HotKeyConfig) -> Self {
        self.hot_key = hot_key;
        self
    }

    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enforces every documented range. Called by the facade constructor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.near.max_size == 0 {
            return Err(ConfigError::out_of_range("near.max_size", "must be > 0"));
        }
        if self.near.default_ttl.is_zero() {
            return Err(ConfigError::out_of_range("near.default_ttl", "must be > 0"));
        }
        if self.far.default_ttl.is_zero() {
            return Err(ConfigError::out_of_range("far.default_ttl", "must be > 0"));
        }
        if self.far.ttl_jitter_pct < MIN_JITTER_PCT || self.far.ttl_jitter_pct > MAX_JITTER_PCT {
            return Err(ConfigError::out_of_range(
                "far.ttl_jitter_pct",
                format!("must be within [{MIN_JITTER_PCT}, {MAX_JITTER_PCT}]"),
            ));
        }
        if self.far.lock_timeout.is_zero() {
            return Err(ConfigError::out_of_range("far.lock_timeout", "must be > 0"));
        }
        if self.filter.expected_insertions == 0 {
            return Err(ConfigError::out_of_range(
                "filter.expected_insertions",
                "must be > 0",
            ));
        }
        if !(self.filter.false_positive_rate > 0.0 && self.filter.false_positive_rate < 1.0) {
            return Err(ConfigError::out_of_range(
                "filter.false_positive_rate",
                "must be within (0, 1)",
            ));
        }
        if !(self.filter.rebuild_threshold > 0.0 && self.filter.rebuild_threshold < 1.0) {
            return Err(ConfigError::out_of_range(
                "filter.rebuild_threshold",
                "must be within (0, 1)",
            ));
        }
        if self.negative.ttl > NEGATIVE_TTL_CEILING {
            return Err(ConfigError::out_of_range(
                "negative.ttl",
                "must not exceed 5 minutes",
            ));
        }
        if self.hot_key.threshold < 1 {
            return Err(ConfigError::out_of_range("hot_key.threshold", "must be >= 1"));
        }
        if self.hot_key.window.is_zero() {
            return Err(ConfigError::out_of_range("hot_key.window", "must be > 0"));
        }
        if self.breaker.failure_threshold < 1 {
            return Err(ConfigError::out_of_range(
                "breaker.failure_threshold",
                "must be >= 1",
            ));
        }
        if self.breaker.reset_timeout.is_zero() {
            return Err(ConfigError::out_of_range(
                "breaker.reset_timeout",
                "must be > 0",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::out_of_range("retry.max_attempts", "must be >= 1"));
        }
        Ok(())
    }
}
