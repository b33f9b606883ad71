//! Networked far-tier backend over Redis.
//!
//! Lock acquisition is `SET lock:<key> <token> NX EX <ttl>`; release is a
//! Lua compare-and-delete so it stays a single atomic round trip on the
//! server.

use std::marker::PhantomData;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::error::{FarCacheError, FarCacheResult};
use super::{FarCache, LOCK_PREFIX, LockAttempt, new_lock_token};
use crate::entry::CacheEntry;

const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

fn map_redis_err(err: redis::RedisError) -> FarCacheError {
    if err.is_timeout() {
        FarCacheError::Timeout(err.to_string())
    } else {
        FarCacheError::Connection(err.to_string())
    }
}

/// TTLs are sent in whole seconds; sub-second values round up so a short
/// lock never becomes eternal (`EX 0` is invalid).
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Redis-backed [`FarCache`].
pub struct RedisFarCache<V> {
    connection: ConnectionManager,
    release_script: Script,
    _marker: PhantomData<fn() -> V>,
}

impl<V> RedisFarCache<V> {
    /// Connects to the given Redis URL (for example `redis://localhost:6379`).
    pub async fn connect(url: &str) -> FarCacheResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| FarCacheError::Connection(e.to_string()))?;
        let connection = ConnectionManager::new(client).await.map_err(map_redis_err)?;

        info!(url, "redis far cache connected");
        Ok(Self {
            connection,
            release_script: Script::new(RELEASE_SCRIPT),
            _marker: PhantomData,
        })
    }
}

impl<V> FarCache<V> for RedisFarCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> FarCacheResult<Option<CacheEntry<V>>> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(key).await.map_err(map_redis_err)?;

        match raw {
            Some(json) => {
                let entry = serde_json::from_str(&json)
                    .map_err(|e| FarCacheError::Serialization(e.to_string()))?;
                debug!(key, "far cache hit");
                Ok(Some(entry))
            }
            None => {
                debug!(key, "far cache miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, entry: &CacheEntry<V>, ttl: Duration) -> FarCacheResult<()> {
        let json =
            serde_json::to_string(entry).map_err(|e| FarCacheError::Serialization(e.to_string()))?;
        let mut connection = self.connection.clone();
        let () = connection
            .set_ex(key, json, ttl_seconds(ttl))
            .await
            .map_err(map_redis_err)?;
        debug!(key, ttl_secs = ttl_seconds(ttl), "far cache put");
        Ok(())
    }

    async fn delete(&self, key: &str) -> FarCacheResult<()> {
        let mut connection = self.connection.clone();
        let _: u64 = connection.del(key).await.map_err(map_redis_err)?;
        debug!(key, "far cache delete");
        Ok(())
    }

    async fn get_with_lock(
        &self,
        key: &str,
        lock_timeout: Duration,
    ) -> FarCacheResult<LockAttempt<V>> {
        let lock_key = format!("{LOCK_PREFIX}{key}");
        let token = new_lock_token();
        let mut connection = self.connection.clone();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&lock_key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(lock_timeout))
            .query_async(&mut connection)
            .await
            .map_err(map_redis_err)?;

        let value = self.get(key).await?;

        if acquired.is_some() {
            debug!(key, "lock acquired");
            Ok(LockAttempt::acquired(value, token))
        } else {
            debug!(key, "lock not acquired");
            Ok(LockAttempt::not_acquired(value))
        }
    }

    async fn release_lock(&self, key: &str, token: &str) -> FarCacheResult<()> {
        let lock_key = format!("{LOCK_PREFIX}{key}");
        let mut connection = self.connection.clone();

        let deleted: u64 = self
            .release_script
            .key(&lock_key)
            .arg(token)
            .invoke_async(&mut connection)
            .await
            .map_err(map_redis_err)?;
        debug!(key, deleted, "lock release attempted");
        Ok(())
    }

    async fn close(&self) {
        // ConnectionManager has no explicit shutdown; dropping the last
        // clone tears the multiplexed connection down.
        info!("redis far cache closed");
    }
}

impl<V> std::fmt::Debug for RedisFarCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisFarCache").finish_non_exhaustive()
    }
}
