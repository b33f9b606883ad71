//! In-process far-tier backend.
//!
//! Stores entries through the same JSON wire format as the networked
//! backend, with deadline-based TTL and an expiring lock table whose
//! release is compare-and-delete. Useful as a single-process far tier and
//! as the store the scenario tests run against.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::error::{FarCacheError, FarCacheResult};
use super::{FarCache, LOCK_PREFIX, LockAttempt, new_lock_token};
use crate::entry::CacheEntry;

struct StoredValue {
    json: String,
    deadline: Option<Instant>,
}

struct LockSlot {
    token: String,
    deadline: Instant,
}

#[derive(Default)]
struct Tables {
    values: HashMap<String, StoredValue>,
    locks: HashMap<String, LockSlot>,
}

/// In-memory [`FarCache`] backend.
pub struct MemoryFarCache<V> {
    tables: Mutex<Tables>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> MemoryFarCache<V> {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            _marker: PhantomData,
        }
    }

    /// Entries currently stored, expired or not. Test helper.
    pub fn len(&self) -> usize {
        self.tables.lock().expect("tables lock poisoned").values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for MemoryFarCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FarCache<V> for MemoryFarCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> FarCacheResult<Option<CacheEntry<V>>> {
        let json = {
            let mut tables = self.tables.lock().expect("tables lock poisoned");
            match tables.values.get(key) {
                Some(stored) => {
                    if stored.deadline.is_some_and(|d| Instant::now() >= d) {
                        tables.values.remove(key);
                        return Ok(None);
                    }
                    stored.json.clone()
                }
                None => return Ok(None),
            }
        };

        let entry = serde_json::from_str(&json)
            .map_err(|e| FarCacheError::Serialization(e.to_string()))?;
        Ok(Some(entry))
    }

    async fn put(&self, key: &str, entry: &CacheEntry<V>, ttl: Duration) -> FarCacheResult<()> {
        let json =
            serde_json::to_string(entry).map_err(|e| FarCacheError::Serialization(e.to_string()))?;
        let mut tables = self.tables.lock().expect("tables lock poisoned");
        tables.values.insert(
            key.to_string(),
            StoredValue {
                json,
                deadline: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> FarCacheResult<()> {
        let mut tables = self.tables.lock().expect("tables lock poisoned");
        tables.values.remove(key);
        Ok(())
    }

    async fn get_with_lock(
        &self,
        key: &str,
        lock_timeout: Duration,
    ) -> FarCacheResult<LockAttempt<V>> {
        let lock_key = format!("{LOCK_PREFIX}{key}");
        let token = new_lock_token();
        let now = Instant::now();

        let (acquired, json) = {
            let mut tables = self.tables.lock().expect("tables lock poisoned");

            let held = match tables.locks.get(&lock_key) {
                Some(slot) if now < slot.deadline => true,
                Some(_) => {
                    // Expired lock falls away exactly as a store-side TTL would.
                    tables.locks.remove(&lock_key);
                    false
                }
                None => false,
            };

            let acquired = if held {
                false
            } else {
                tables.locks.insert(
                    lock_key.clone(),
                    LockSlot {
                        token: token.clone(),
                        deadline: now + lock_timeout,
                    },
                );
                true
            };

            let json = match tables.values.get(key) {
                Some(stored) if !stored.deadline.is_some_and(|d| now >= d) => {
                    Some(stored.json.clone())
                }
                _ => None,
            };

            (acquired, json)
        };

        let value = match json {
            Some(json) => Some(
                serde_json::from_str(&json)
                    .map_err(|e| FarCacheError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        debug!(key, acquired, "lock attempt");
        if acquired {
            Ok(LockAttempt::acquired(value, token))
        } else {
            Ok(LockAttempt::not_acquired(value))
        }
    }

    async fn release_lock(&self, key: &str, token: &str) -> FarCacheResult<()> {
        let lock_key = format!("{LOCK_PREFIX}{key}");
        let mut tables = self.tables.lock().expect("tables lock poisoned");
        // Compare-and-delete: only the holder's token releases the slot.
        if tables.locks.get(&lock_key).is_some_and(|slot| slot.token == token) {
            tables.locks.remove(&lock_key);
            debug!(key, "lock released");
        }
        Ok(())
    }

    async fn close(&self) {
        let mut tables = self.tables.lock().expect("tables lock poisoned");
        tables.values.clear();
        tables.locks.clear();
        info!("memory far cache closed");
    }
}

impl<V> std::fmt::Debug for MemoryFarCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock().expect("tables lock poisoned");
        f.debug_struct("MemoryFarCache")
            .field("values", &tables.values.len())
            .field("locks", &tables.locks.len())
            .finish()
    }
}
