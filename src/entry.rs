//! Versioned value wrapper stored at both tiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// Process-wide version source. Versions are advisory (debugging, future
// CAS); nothing in the read/write paths consults them for correctness.
static VERSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_version() -> u64 {
    // Relaxed: versions only need to be distinct and increasing, there is
    // no ordering relationship with the entry's payload.
    VERSION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// An immutable cache record: payload (absent for negative entries), both
/// instants, a version, and the negative/hot flags.
///
/// Staleness is evaluated against the wall clock; an entry past
/// `expires_at` never leaves a tier adapter or the facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    value: Option<V>,
    created_at: SystemTime,
    expires_at: SystemTime,
    version: u64,
    is_negative: bool,
    is_hot: bool,
}

impl<V> CacheEntry<V> {
    /// A regular value entry, stamped with a fresh version.
    pub fn new(value: V, expires_at: SystemTime, is_hot: bool) -> Self {
        Self {
            value: Some(value),
            created_at: SystemTime::now(),
            expires_at,
            version: next_version(),
            is_negative: false,
            is_hot,
        }
    }

    /// A negative entry recording the authoritative absence of a key.
    pub fn negative(expires_at: SystemTime) -> Self {
        Self {
            value: None,
            created_at: SystemTime::now(),
            expires_at,
            version: next_version(),
            is_negative: true,
            is_hot: false,
        }
    }

    #[inline]
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    #[inline]
    pub fn into_value(self) -> Option<V> {
        if self.is_negative { None } else { self.value }
    }

    #[inline]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    #[inline]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.is_negative
    }

    #[inline]
    pub fn is_hot(&self) -> bool {
        self.is_hot
    }

    /// True once the wall clock has passed `expires_at`.
    #[inline]
    pub fn is_stale(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}
