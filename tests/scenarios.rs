//! End-to-end protection scenarios against the in-memory far tier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use strata::{
    BreakerConfig, CacheConfig, CacheEventType, CacheFacade, CacheLevel, CircuitState, DataLoader,
    HotKeyConfig, MemoryFarCache, RetryConfig,
};

/// Map-backed data source that counts calls and can be switched to fail or
/// to respond slowly.
#[derive(Clone, Default)]
struct ScenarioLoader {
    data: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<AtomicU32>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl ScenarioLoader {
    fn with_data(pairs: &[(&str, &str)]) -> Self {
        let loader = Self::default();
        {
            let mut data = loader.data.lock().expect("data lock");
            for (k, v) in pairs {
                data.insert(k.to_string(), v.to_string());
            }
        }
        loader
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn set(&self, key: &str, value: &str) {
        self.data
            .lock()
            .expect("data lock")
            .insert(key.to_string(), value.to_string());
    }
}

impl DataLoader<String, String> for ScenarioLoader {
    async fn load(
        &self,
        key: &String,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err("database unreachable".into());
        }
        Ok(self.data.lock().expect("data lock").get(key).cloned())
    }
}

type Facade = CacheFacade<String, String, MemoryFarCache<String>, ScenarioLoader>;

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        ..Default::default()
    }
}

/// Standard fixture: source holds user:1 -> A and user:2 -> B, both
/// pre-loaded into the membership filter.
fn standard_facade(config: CacheConfig) -> (Facade, ScenarioLoader) {
    let loader = ScenarioLoader::with_data(&[("user:1", "A"), ("user:2", "B")]);
    let facade =
        CacheFacade::new(config, MemoryFarCache::new(), loader.clone()).expect("valid config");
    facade.filter().insert_all(["user:1", "user:2"]);
    (facade, loader)
}

#[tokio::test]
async fn penetration_rejected_by_filter() {
    let (facade, loader) = standard_facade(CacheConfig::default().retry(fast_retry()));

    let got = facade.get(&"user:999".to_string()).await;

    assert_eq!(got, None);
    assert_eq!(facade.metrics().event_count(CacheEventType::Penetration), 1);
    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn cold_read_warms_both_tiers() {
    let (facade, loader) = standard_facade(CacheConfig::default().retry(fast_retry()));

    let first = facade.get(&"user:1".to_string()).await;
    let second = facade.get(&"user:1".to_string()).await;

    assert_eq!(first, Some("A".to_string()));
    assert_eq!(second, Some("A".to_string()));
    assert_eq!(loader.calls(), 1);
    assert_eq!(facade.metrics().hit_count(CacheLevel::L1Near), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hot_key_misses_collapse_to_single_flight() {
    let loader =
        ScenarioLoader::with_data(&[("user:1", "A"), ("user:2", "B")]).delayed(Duration::from_millis(10));
    let config = CacheConfig::default().retry(fast_retry()).hot_key(HotKeyConfig {
        enabled: true,
        threshold: 3,
        window: Duration::from_secs(30),
    });
    let facade =
        CacheFacade::new(config, MemoryFarCache::new(), loader.clone()).expect("valid config");
    facade.filter().insert_all(["user:1", "user:2"]);

    // Three serial reads mark the key hot.
    for _ in 0..3 {
        assert_eq!(
            facade.get(&"user:1".to_string()).await,
            Some("A".to_string())
        );
    }
    assert!(facade.hot_keys().is_hot("user:1"));

    // Evict everywhere, then stampede.
    facade.delete(&"user:1".to_string()).await;
    let calls_before = loader.calls();

    let mut tasks = Vec::new();
    for _ in 0..100 {
        let facade = facade.clone();
        tasks.push(tokio::spawn(async move {
            facade.get(&"user:1".to_string()).await
        }));
    }

    for task in tasks {
        let got = task.await.expect("task completed");
        assert_eq!(got, Some("A".to_string()));
    }

    let stampede_loads = loader.calls() - calls_before;
    assert!(
        stampede_loads <= 5,
        "expected single-flight to collapse loads, saw {stampede_loads}"
    );
    assert!(facade.metrics().event_count(CacheEventType::Breakdown) >= 1);
}

#[tokio::test]
async fn loader_miss_is_negatively_cached() {
    let (facade, loader) = standard_facade(CacheConfig::default().retry(fast_retry()));
    facade.filter().insert("user:404");

    assert_eq!(facade.get(&"user:404".to_string()).await, None);
    assert_eq!(facade.get(&"user:404".to_string()).await, None);

    assert_eq!(loader.calls(), 1, "second miss must be served by the negative entry");
}

#[tokio::test]
async fn breaker_trips_and_probes_after_reset_timeout() {
    let loader = ScenarioLoader::with_data(&[]);
    loader.failing.store(true, Ordering::SeqCst);

    let config = CacheConfig::default().retry(fast_retry()).breaker(BreakerConfig {
        enabled: true,
        failure_threshold: 3,
        reset_timeout: Duration::from_millis(100),
    });
    let facade =
        CacheFacade::new(config, MemoryFarCache::new(), loader.clone()).expect("valid config");
    facade.filter().insert_all(["k1", "k2", "k3", "k4", "k5"]);

    for key in ["k1", "k2", "k3"] {
        assert_eq!(facade.get(&key.to_string()).await, None);
    }
    assert_eq!(facade.breaker().state(), CircuitState::Open);
    assert_eq!(loader.calls(), 3);

    // Within the reset timeout the loader is never consulted.
    assert_eq!(facade.get(&"k4".to_string()).await, None);
    assert_eq!(loader.calls(), 3);

    // After the timeout exactly one probe goes through.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(facade.get(&"k5".to_string()).await, None);
    assert_eq!(loader.calls(), 4);
    assert_eq!(facade.breaker().state(), CircuitState::Open);
}

#[tokio::test]
async fn breaker_recovers_through_successful_probe() {
    let loader = ScenarioLoader::with_data(&[("user:1", "A")]);
    loader.failing.store(true, Ordering::SeqCst);

    let config = CacheConfig::default().retry(fast_retry()).breaker(BreakerConfig {
        enabled: true,
        failure_threshold: 2,
        reset_timeout: Duration::from_millis(50),
    });
    let facade =
        CacheFacade::new(config, MemoryFarCache::new(), loader.clone()).expect("valid config");
    facade.filter().insert("user:1");

    facade.get(&"user:1".to_string()).await;
    facade.get(&"user:1".to_string()).await;
    assert_eq!(facade.breaker().state(), CircuitState::Open);

    loader.failing.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(
        facade.get(&"user:1".to_string()).await,
        Some("A".to_string())
    );
    assert_eq!(facade.breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn delayed_double_delete_kills_racy_repopulation() {
    let (facade, loader) = standard_facade(CacheConfig::default().retry(fast_retry()));

    facade.put(&"user:1".to_string(), "A".to_string(), None).await;
    facade.invalidate(&"user:1".to_string()).await;

    // A racing reader repopulates stale state between the two deletes.
    tokio::time::sleep(Duration::from_millis(200)).await;
    facade
        .put(&"user:1".to_string(), "A_old".to_string(), None)
        .await;

    // The second delete lands ~500 ms after the invalidate.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let calls_before = loader.calls();
    let got = facade.get(&"user:1".to_string()).await;

    assert_eq!(got, Some("A".to_string()), "stale repopulation must not survive");
    assert_eq!(loader.calls(), calls_before + 1, "read must go back to the source");
}

#[tokio::test]
async fn repeated_invalidate_is_idempotent() {
    let (facade, _loader) = standard_facade(CacheConfig::default().retry(fast_retry()));

    facade.put(&"user:1".to_string(), "A".to_string(), None).await;
    facade.invalidate(&"user:1".to_string()).await;
    facade.invalidate(&"user:1".to_string()).await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        facade.get(&"user:1".to_string()).await,
        Some("A".to_string())
    );

    facade.close().await;
}

#[tokio::test]
async fn far_tier_serves_after_near_expiry() {
    let loader = ScenarioLoader::with_data(&[("user:1", "A")]);
    let mut config = CacheConfig::default().retry(fast_retry());
    config.near.default_ttl = Duration::from_millis(30);

    let facade =
        CacheFacade::new(config, MemoryFarCache::new(), loader.clone()).expect("valid config");
    facade.filter().insert("user:1");

    assert_eq!(
        facade.get(&"user:1".to_string()).await,
        Some("A".to_string())
    );
    tokio::time::sleep(Duration::from_millis(60)).await;

    // Near tier expired; the far tier still holds the entry.
    assert_eq!(
        facade.get(&"user:1".to_string()).await,
        Some("A".to_string())
    );
    assert_eq!(loader.calls(), 1);
    assert_eq!(facade.metrics().hit_count(CacheLevel::L2Far), 1);
}

#[tokio::test]
async fn source_update_visible_after_invalidate_settles() {
    let (facade, loader) = standard_facade(CacheConfig::default().retry(fast_retry()));

    assert_eq!(
        facade.get(&"user:1".to_string()).await,
        Some("A".to_string())
    );

    loader.set("user:1", "A2");
    facade.invalidate(&"user:1".to_string()).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(
        facade.get(&"user:1".to_string()).await,
        Some("A2".to_string())
    );
}
