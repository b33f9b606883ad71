//! Sliding-window hot-key detection.
//!
//! Every access appends a timestamp to the key's record and prunes entries
//! older than the window; a key whose in-window count reaches the threshold
//! joins the hot set, and the facade routes its misses through single
//! flight. Records are created lazily and never destroyed; the residual
//! memory of one record per distinct key ever seen is accepted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::HotKeyConfig;

/// Per-key access history.
///
/// The deque is guarded by its own mutex while the counter is a separate
/// atomic, so a reader between the push and the increment can observe a
/// one-off disagreement; it resolves on the next call.
struct AccessRecord {
    timestamps: Mutex<VecDeque<Instant>>,
    count: AtomicUsize,
}

impl AccessRecord {
    fn new() -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::new()),
            count: AtomicUsize::new(0),
        }
    }

    fn add_access(&self, at: Instant) {
        self.timestamps.lock().expect("record lock poisoned").push_back(at);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops timestamps older than the cutoff, decrementing per drop so the
    /// counter stays in agreement with the sequence.
    fn clean_expired(&self, cutoff: Instant) {
        let mut timestamps = self.timestamps.lock().expect("record lock poisoned");
        while let Some(first) = timestamps.front() {
            if *first < cutoff {
                timestamps.pop_front();
                self.count.fetch_sub(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    #[inline]
    fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

struct DetectorParams {
    threshold: usize,
    window: Duration,
}

/// Sliding-window detector over canonical key strings.
pub struct HotKeyDetector {
    records: RwLock<HashMap<String, Arc<AccessRecord>>>,
    hot_keys: RwLock<HashSet<String>>,
    params: RwLock<DetectorParams>,
    enabled: bool,
}

impl HotKeyDetector {
    pub fn new(config: HotKeyConfig) -> Self {
        info!(
            threshold = config.threshold,
            window_ms = config.window.as_millis() as u64,
            enabled = config.enabled,
            "hot-key detector initialized"
        );
        Self {
            records: RwLock::new(HashMap::new()),
            hot_keys: RwLock::new(HashSet::new()),
            params: RwLock::new(DetectorParams {
                threshold: config.threshold as usize,
                window: config.window,
            }),
            enabled: config.enabled,
        }
    }

    /// Records one access and re-evaluates the key's hot-set membership.
    pub fn record_access(&self, key: &str) {
        if !self.enabled {
            return;
        }

        let now = Instant::now();
        let record = self.record_for(key);
        record.add_access(now);

        let (threshold, window) = {
            let params = self.params.read().expect("params lock poisoned");
            (params.threshold, params.window)
        };
        if let Some(cutoff) = now.checked_sub(window) {
            record.clean_expired(cutoff);
        }

        self.update_membership(key, record.count() >= threshold);
    }

    /// Whether the key is currently classified hot.
    pub fn is_hot(&self, key: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.hot_keys.read().expect("hot set lock poisoned").contains(key)
    }

    /// Snapshot of the current hot set.
    pub fn hot_keys(&self) -> HashSet<String> {
        if !self.enabled {
            return HashSet::new();
        }
        self.hot_keys.read().expect("hot set lock poisoned").clone()
    }

    /// Replaces threshold and window, then re-evaluates every known key
    /// under the new parameters.
    pub fn reconfigure(&self, threshold: u32, window: Duration) {
        {
            let mut params = self.params.write().expect("params lock poisoned");
            params.threshold = threshold as usize;
            params.window = window;
        }
        info!(
            threshold,
            window_ms = window.as_millis() as u64,
            "hot-key parameters updated"
        );

        let now = Instant::now();
        let records: Vec<(String, Arc<AccessRecord>)> = {
            let records = self.records.read().expect("records lock poisoned");
            records.iter().map(|(k, r)| (k.clone(), Arc::clone(r))).collect()
        };
        for (key, record) in records {
            if let Some(cutoff) = now.checked_sub(window) {
                record.clean_expired(cutoff);
            }
            self.update_membership(&key, record.count() >= threshold as usize);
        }
    }

    fn record_for(&self, key: &str) -> Arc<AccessRecord> {
        if let Some(record) = self.records.read().expect("records lock poisoned").get(key) {
            return Arc::clone(record);
        }
        let mut records = self.records.write().expect("records lock poisoned");
        Arc::clone(
            records
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AccessRecord::new())),
        )
    }

    fn update_membership(&self, key: &str, hot: bool) {
        // Read-check first so the steady state takes no write lock.
        let present = self.hot_keys.read().expect("hot set lock poisoned").contains(key);
        if hot == present {
            return;
        }
        let mut hot_keys = self.hot_keys.write().expect("hot set lock poisoned");
        if hot {
            if hot_keys.insert(key.to_string()) {
                info!(key, "hot key detected");
            }
        } else {
            hot_keys.remove(key);
        }
    }
}

impl std::fmt::Debug for HotKeyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotKeyDetector")
            .field("tracked_keys", &self.records.read().expect("records lock poisoned").len())
            .field("hot_keys", &self.hot_keys.read().expect("hot set lock poisoned").len())
            .field("enabled", &self.enabled)
            .finish()
    }
}
