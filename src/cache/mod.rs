//! Two-tier caching infrastructure.
//!
//! - **Near tier**: bounded, TTL-expiring, in-process ([`NearCache`])
//! - **Far tier**: shared key/value store with per-key locks ([`FarCache`])
//! - **Facade**: the read-through/write-through orchestrator
//!   ([`CacheFacade`])
//!
//! Start at [`CacheFacade`].

/// Read-through facade and its collaborator traits.
pub mod facade;
/// Far-tier trait and backends.
pub mod far;
/// Near-tier adapter.
pub mod near;


pub use facade::{CacheFacade, CacheKey, DataLoader};
pub use far::{FarCache, FarCacheError, FarCacheResult, LockAttempt, MemoryFarCache};
#[cfg(feature = "redis")]
pub use far::RedisFarCache;
pub use near::{NearCache, NearCacheStats};
