//! Hit/miss, event, and latency counters with a text exposition.
//!
//! Counters are plain atomics in fixed arrays indexed by the enum tags, so
//! recording is lock-free on every path. `snapshot` reads each series once
//! and derives hit rates from those reads, keeping the rate consistent with
//! the counts it was computed from.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::types::{CacheEventType, CacheLevel, CacheOperation};

#[derive(Default)]
struct LatencyRecorder {
    total_nanos: AtomicU64,
    count: AtomicU64,
}

impl LatencyRecorder {
    fn record(&self, nanos: u64) {
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn average_nanos(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            self.total_nanos.load(Ordering::Relaxed) as f64 / count as f64
        }
    }
}

/// Point-in-time view of every counter.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: SystemTime,
    pub hits: HashMap<CacheLevel, u64>,
    pub misses: HashMap<CacheLevel, u64>,
    pub hit_rates: HashMap<CacheLevel, f64>,
    pub avg_latency_nanos: HashMap<CacheOperation, f64>,
    pub events: HashMap<CacheEventType, u64>,
}

/// Concurrent metrics recorder for the whole cache system.
#[derive(Default)]
pub struct CacheMetrics {
    hits: [AtomicU64; CacheLevel::ALL.len()],
    misses: [AtomicU64; CacheLevel::ALL.len()],
    latencies: [LatencyRecorder; CacheOperation::ALL.len()],
    events: [AtomicU64; CacheEventType::ALL.len()],
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self, level: CacheLevel) {
        self.hits[level.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self, level: CacheLevel) {
        self.misses[level.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_latency(&self, operation: CacheOperation, latency: Duration) {
        self.latencies[operation.index()].record(latency.as_nanos() as u64);
    }

    #[inline]
    pub fn record_event(&self, event: CacheEventType) {
        self.events[event.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_count(&self, level: CacheLevel) -> u64 {
        self.hits[level.index()].load(Ordering::Relaxed)
    }

    pub fn miss_count(&self, level: CacheLevel) -> u64 {
        self.misses[level.index()].load(Ordering::Relaxed)
    }

    pub fn event_count(&self, event: CacheEventType) -> u64 {
        self.events[event.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut hits = HashMap::new();
        let mut misses = HashMap::new();
        let mut hit_rates = HashMap::new();
        for level in CacheLevel::ALL {
            let h = self.hits[level.index()].load(Ordering::Relaxed);
            let m = self.misses[level.index()].load(Ordering::Relaxed);
            hits.insert(level, h);
            misses.insert(level, m);
            let total = h + m;
            hit_rates.insert(level, if total > 0 { h as f64 / total as f64 } else { 0.0 });
        }

        let mut avg_latency_nanos = HashMap::new();
        for op in CacheOperation::ALL {
            avg_latency_nanos.insert(op, self.latencies[op.index()].average_nanos());
        }

        let mut events = HashMap::new();
        for event in CacheEventType::ALL {
            events.insert(event, self.events[event.index()].load(Ordering::Relaxed));
        }

        MetricsSnapshot {
            timestamp: SystemTime::now(),
            hits,
            misses,
            hit_rates,
            avg_latency_nanos,
            events,
        }
    }

    /// Prometheus-style text exposition of every series.
    pub fn export_text(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP cache_hits_total Total number of cache hits\n");
        out.push_str("# TYPE cache_hits_total counter\n");
        for level in CacheLevel::ALL {
            let _ = writeln!(
                out,
                "cache_hits_total{{level=\"{}\"}} {}",
                level.as_label(),
                self.hits[level.index()].load(Ordering::Relaxed)
            );
        }

        out.push_str("# HELP cache_misses_total Total number of cache misses\n");
        out.push_str("# TYPE cache_misses_total counter\n");
        for level in CacheLevel::ALL {
            let _ = writeln!(
                out,
                "cache_misses_total{{level=\"{}\"}} {}",
                level.as_label(),
                self.misses[level.index()].load(Ordering::Relaxed)
            );
        }

        out.push_str("# HELP cache_hit_rate Cache hit rate\n");
        out.push_str("# TYPE cache_hit_rate gauge\n");
        for level in CacheLevel::ALL {
            let h = self.hits[level.index()].load(Ordering::Relaxed);
            let m = self.misses[level.index()].load(Ordering::Relaxed);
            let total = h + m;
            let rate = if total > 0 { h as f64 / total as f64 } else { 0.0 };
            let _ = writeln!(out, "cache_hit_rate{{level=\"{}\"}} {:.4}", level.as_label(), rate);
        }

        out.push_str(
            "# HELP cache_operation_latency_nanoseconds Average operation latency in nanoseconds\n",
        );
        out.push_str("# TYPE cache_operation_latency_nanoseconds gauge\n");
        for op in CacheOperation::ALL {
            let _ = writeln!(
                out,
                "cache_operation_latency_nanoseconds{{operation=\"{}\"}} {:.2}",
                op.as_label(),
                self.latencies[op.index()].average_nanos()
            );
        }

        out.push_str("# HELP cache_events_total Total number of cache events\n");
        out.push_str("# TYPE cache_events_total counter\n");
        for event in CacheEventType::ALL {
            let _ = writeln!(
                out,
                "cache_events_total{{type=\"{}\"}} {}",
                event.as_label(),
                self.events[event.index()].load(Ordering::Relaxed)
            );
        }

        out
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics")
            .field("l1_hits", &self.hit_count(CacheLevel::L1Near))
            .field("l2_hits", &self.hit_count(CacheLevel::L2Far))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = CacheMetrics::new();
        metrics.record_hit(CacheLevel::L1Near);
        metrics.record_hit(CacheLevel::L1Near);
        metrics.record_miss(CacheLevel::L1Near);
        metrics.record_event(CacheEventType::Penetration);

        assert_eq!(metrics.hit_count(CacheLevel::L1Near), 2);
        assert_eq!(metrics.miss_count(CacheLevel::L1Near), 1);
        assert_eq!(metrics.hit_count(CacheLevel::L2Far), 0);
        assert_eq!(metrics.event_count(CacheEventType::Penetration), 1);
    }

    #[test]
    fn snapshot_rates_match_counts() {
        let metrics = CacheMetrics::new();
        for _ in 0..3 {
            metrics.record_hit(CacheLevel::L2Far);
        }
        metrics.record_miss(CacheLevel::L2Far);

        let snapshot = metrics.snapshot();
        let hits = snapshot.hits[&CacheLevel::L2Far];
        let misses = snapshot.misses[&CacheLevel::L2Far];
        assert_eq!(hits, 3);
        assert_eq!(misses, 1);
        assert_eq!(
            snapshot.hit_rates[&CacheLevel::L2Far],
            hits as f64 / (hits + misses) as f64
        );
    }

    #[test]
    fn empty_levels_report_zero_rate() {
        let metrics = CacheMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hit_rates[&CacheLevel::L1Near], 0.0);
    }

    #[test]
    fn latency_average_tracks_recordings() {
        let metrics = CacheMetrics::new();
        metrics.record_latency(CacheOperation::Get, Duration::from_nanos(100));
        metrics.record_latency(CacheOperation::Get, Duration::from_nanos(300));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.avg_latency_nanos[&CacheOperation::Get], 200.0);
        assert_eq!(snapshot.avg_latency_nanos[&CacheOperation::Put], 0.0);
    }

    #[test]
    fn export_text_contains_every_series() {
        let metrics = CacheMetrics::new();
        metrics.record_hit(CacheLevel::L1Near);
        metrics.record_miss(CacheLevel::L2Far);
        metrics.record_event(CacheEventType::Breakdown);
        metrics.record_latency(CacheOperation::Delete, Duration::from_micros(5));

        let text = metrics.export_text();
        assert!(text.contains("cache_hits_total{level=\"l1_near\"} 1"));
        assert!(text.contains("cache_misses_total{level=\"l2_far\"} 1"));
        assert!(text.contains("cache_hit_rate{level=\"l1_near\"} 1.0000"));
        assert!(text.contains("cache_operation_latency_nanoseconds{operation=\"delete\"} 5000.00"));
        assert!(text.contains("cache_events_total{type=\"breakdown\"} 1"));
        assert!(text.contains("# TYPE cache_hits_total counter"));
        assert!(text.contains("# TYPE cache_hit_rate gauge"));
    }
}
