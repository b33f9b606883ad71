//! Approximate-membership filter used as the penetration guard.
//!
//! A Bloom filter sized from the configured expected insertions and target
//! false-positive rate. False negatives are forbidden for keys inserted
//! since the last rebuild; false positives are bounded by the configured
//! rate while the filter stays within its sizing.
//!
//! The filter watches its own estimated false-positive rate and warns when
//! it crosses the rebuild threshold, but never rebuilds itself: rebuilding
//! needs the authoritative key set, which only the operator has.

use std::sync::RwLock;

use tracing::{debug, info, warn};

use crate::config::FilterConfig;

/// Snapshot of filter sizing and load.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStats {
    pub expected_insertions: u64,
    pub actual_insertions: u64,
    pub estimated_fp_rate: f64,
    pub bit_size: u64,
    pub hash_functions: u32,
}

struct BitArray {
    words: Vec<u64>,
    bits: u64,
    insertions: u64,
}

impl BitArray {
    fn new(bits: u64) -> Self {
        let words = vec![0u64; bits.div_ceil(64) as usize];
        Self {
            words,
            bits,
            insertions: 0,
        }
    }

    #[inline]
    fn set(&mut self, bit: u64) -> bool {
        let word = (bit / 64) as usize;
        let mask = 1u64 << (bit % 64);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    #[inline]
    fn get(&self, bit: u64) -> bool {
        let word = (bit / 64) as usize;
        let mask = 1u64 << (bit % 64);
        self.words[word] & mask != 0
    }
}

/// Bloom-style membership filter over canonical key strings.
pub struct KeyFilter {
    inner: RwLock<BitArray>,
    hash_functions: u32,
    config: FilterConfig,
}

impl KeyFilter {
    /// Sizes the bit array and hash count from the config:
    /// `m = -n ln p / (ln 2)^2`, `k = (m / n) ln 2`.
    pub fn new(config: FilterConfig) -> Self {
        let n = config.expected_insertions as f64;
        let p = config.false_positive_rate;

        let bits = (-n * p.ln() / (2f64.ln() * 2f64.ln())).ceil().max(64.0) as u64;
        let hash_functions = ((bits as f64 / n) * 2f64.ln()).ceil().max(1.0) as u32;

        info!(
            expected_insertions = config.expected_insertions,
            false_positive_rate = config.false_positive_rate,
            bits,
            hash_functions,
            "key filter sized"
        );

        Self {
            inner: RwLock::new(BitArray::new(bits)),
            hash_functions,
            config,
        }
    }

    /// Double hashing (Kirsch–Mitzenmacher): the i-th probe is
    /// `h1 + i * h2 mod m`, both halves taken from one BLAKE3 digest.
    #[inline]
    fn hash_pair(key: &str) -> (u64, u64) {
        let digest = blake3::hash(key.as_bytes());
        let bytes = digest.as_bytes();
        let h1 = u64::from_le_bytes(bytes[0..8].try_into().expect("digest has 32 bytes"));
        let h2 = u64::from_le_bytes(bytes[8..16].try_into().expect("digest has 32 bytes"));
        // An even h2 can degenerate to a short probe cycle; force odd.
        (h1, h2 | 1)
    }

    /// True when the key may have been inserted; false means definitely not.
    pub fn might_contain(&self, key: &str) -> bool {
        let inner = self.inner.read().expect("filter lock poisoned");
        let (h1, h2) = Self::hash_pair(key);
        (0..self.hash_functions as u64)
            .all(|i| inner.get(h1.wrapping_add(i.wrapping_mul(h2)) % inner.bits))
    }

    /// Marks a key present. Counts only elements that set at least one new
    /// bit; re-inserting a present key is a no-op.
    pub fn insert(&self, key: &str) {
        let newly_added = {
            let mut inner = self.inner.write().expect("filter lock poisoned");
            let (h1, h2) = Self::hash_pair(key);
            let mut changed = false;
            for i in 0..self.hash_functions as u64 {
                let bit = h1.wrapping_add(i.wrapping_mul(h2)) % inner.bits;
                changed |= inner.set(bit);
            }
            if changed {
                inner.insertions += 1;
            }
            changed
        };

        if newly_added {
            let rate = self.estimated_fp_rate();
            if rate > self.config.rebuild_threshold {
                warn!(
                    estimated_fp_rate = rate,
                    rebuild_threshold = self.config.rebuild_threshold,
                    "filter false-positive rate above rebuild threshold, consider rebuilding"
                );
            }
        }
    }

    /// Inserts every key in the iterator.
    pub fn insert_all<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.insert(key.as_ref());
        }
    }

    /// Atomically replaces the filter with a fresh one sized to the same
    /// parameters, containing exactly the supplied keys. Readers block only
    /// for the swap.
    pub fn rebuild<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bits = self.inner.read().expect("filter lock poisoned").bits;
        let mut fresh = BitArray::new(bits);

        let mut count = 0u64;
        for key in keys {
            let (h1, h2) = Self::hash_pair(key.as_ref());
            let mut changed = false;
            for i in 0..self.hash_functions as u64 {
                changed |= fresh.set(h1.wrapping_add(i.wrapping_mul(h2)) % bits);
            }
            if changed {
                count += 1;
            }
        }
        fresh.insertions = count;

        let mut inner = self.inner.write().expect("filter lock poisoned");
        *inner = fresh;
        info!(insertions = count, "key filter rebuilt");
    }

    /// Estimated false-positive rate at the current load:
    /// `(1 - e^(-k n / m))^k`.
    pub fn estimated_fp_rate(&self) -> f64 {
        let inner = self.inner.read().expect("filter lock poisoned");
        let k = self.hash_functions as f64;
        let n = inner.insertions as f64;
        let m = inner.bits as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    pub fn stats(&self) -> FilterStats {
        let inner = self.inner.read().expect("filter lock poisoned");
        let k = self.hash_functions as f64;
        let n = inner.insertions as f64;
        let m = inner.bits as f64;
        let rate = (1.0 - (-k * n / m).exp()).powf(k);
        debug!(insertions = inner.insertions, estimated_fp_rate = rate, "filter stats read");
        FilterStats {
            expected_insertions: self.config.expected_insertions,
            actual_insertions: inner.insertions,
            estimated_fp_rate: rate,
            bit_size: inner.bits,
            hash_functions: self.hash_functions,
        }
    }
}

impl std::fmt::Debug for KeyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("filter lock poisoned");
        f.debug_struct("KeyFilter")
            .field("bits", &inner.bits)
            .field("hash_functions", &self.hash_functions)
            .field("insertions", &inner.insertions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_filter() -> KeyFilter {
        KeyFilter::new(FilterConfig {
            expected_insertions: 1_000,
            false_positive_rate: 0.01,
            rebuild_threshold: 0.05,
        })
    }

    #[test]
    fn no_false_negatives() {
        let filter = small_filter();
        let keys: Vec<String> = (0..1_000).map(|i| format!("user:{i}")).collect();

        filter.insert_all(&keys);

        for key in &keys {
            assert!(filter.might_contain(key), "inserted key {key} must be found");
        }
    }

    #[test]
    fn unseen_keys_mostly_rejected() {
        let filter = small_filter();
        filter.insert_all((0..500).map(|i| format!("user:{i}")));

        let false_positives = (0..1_000)
            .map(|i| format!("ghost:{i}"))
            .filter(|k| filter.might_contain(k))
            .count();

        // Sized for 1% at full load; at half load a 5% ceiling is generous.
        assert!(
            false_positives < 50,
            "expected <50 false positives, got {false_positives}"
        );
    }

    #[test]
    fn reinsert_does_not_recount() {
        let filter = small_filter();
        filter.insert("user:1");
        filter.insert("user:1");

        assert_eq!(filter.stats().actual_insertions, 1);
    }

    #[test]
    fn rebuild_replaces_contents() {
        let filter = small_filter();
        filter.insert_all((0..100).map(|i| format!("old:{i}")));

        let kept: Vec<String> = (0..10).map(|i| format!("new:{i}")).collect();
        filter.rebuild(&kept);

        let stats = filter.stats();
        assert_eq!(stats.actual_insertions, 10);
        for key in &kept {
            assert!(filter.might_contain(key));
        }
    }

    #[test]
    fn fp_rate_grows_with_load() {
        let filter = small_filter();
        let empty_rate = filter.estimated_fp_rate();

        filter.insert_all((0..1_000).map(|i| format!("user:{i}")));
        let loaded_rate = filter.estimated_fp_rate();

        assert!(empty_rate < loaded_rate);
        assert!(loaded_rate > 0.0 && loaded_rate < 1.0);
    }

    #[test]
    fn stats_reports_sizing() {
        let filter = small_filter();
        let stats = filter.stats();

        assert_eq!(stats.expected_insertions, 1_000);
        assert!(stats.bit_size > 0);
        assert!(stats.hash_functions >= 1);
        assert_eq!(stats.actual_insertions, 0);
    }
}
