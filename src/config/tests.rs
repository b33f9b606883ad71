use std::time::Duration;

use super::*;

#[test]
fn defaults_validate() {
    CacheConfig::default().validate().expect("defaults are valid");
}

#[test]
fn defaults_match_documented_values() {
    let config = CacheConfig::default();

    assert_eq!(config.near.max_size, 10_000);
    assert_eq!(config.near.default_ttl, Duration::from_secs(60));
    assert!(config.near.record_stats);

    assert_eq!(config.far.default_ttl, Duration::from_secs(300));
    assert_eq!(config.far.ttl_jitter_pct, 20);
    assert_eq!(config.far.lock_timeout, Duration::from_secs(3));

    assert_eq!(config.filter.expected_insertions, 100_000);
    assert_eq!(config.filter.false_positive_rate, 0.01);
    assert_eq!(config.filter.rebuild_threshold, 0.05);

    assert!(config.negative.enabled);
    assert_eq!(config.negative.ttl, Duration::from_secs(300));

    assert_eq!(config.hot_key.threshold, 100);
    assert_eq!(config.hot_key.window, Duration::from_secs(60));

    assert_eq!(config.breaker.failure_threshold, 5);
    assert_eq!(config.breaker.reset_timeout, Duration::from_secs(30));

    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.initial_delay, Duration::from_millis(100));
    assert_eq!(config.retry.max_delay, Duration::from_secs(5));
}

#[test]
fn rejects_zero_near_size() {
    let config = CacheConfig::default().near(NearCacheConfig {
        max_size: 0,
        ..Default::default()
    });
    assert!(config.validate().is_err());
}

#[test]
fn rejects_jitter_outside_band() {
    for pct in [0, 9, 31, 100] {
        let config = CacheConfig::default().far(FarCacheConfig {
            ttl_jitter_pct: pct,
            ..Default::default()
        });
        assert!(config.validate().is_err(), "pct {pct} should be rejected");
    }

    for pct in [10, 20, 30] {
        let config = CacheConfig::default().far(FarCacheConfig {
            ttl_jitter_pct: pct,
            ..Default::default()
        });
        assert!(config.validate().is_ok(), "pct {pct} should be accepted");
    }
}

#[test]
fn rejects_fp_rate_bounds() {
    for rate in [0.0, 1.0, -0.5, 1.5] {
        let config = CacheConfig::default().filter(FilterConfig {
            false_positive_rate: rate,
            ..Default::default()
        });
        assert!(config.validate().is_err(), "rate {rate} should be rejected");
    }
}

#[test]
fn rejects_oversized_negative_ttl() {
    let config = CacheConfig::default().negative(NegativeCacheConfig {
        enabled: true,
        ttl: Duration::from_secs(301),
    });
    assert!(config.validate().is_err());

    let config = CacheConfig::default().negative(NegativeCacheConfig {
        enabled: true,
        ttl: Duration::from_secs(300),
    });
    assert!(config.validate().is_ok());
}

#[test]
fn rejects_zero_breaker_threshold() {
    let config = CacheConfig::default().breaker(BreakerConfig {
        failure_threshold: 0,
        ..Default::default()
    });
    assert!(config.validate().is_err());
}

#[test]
fn error_names_the_offending_option() {
    let config = CacheConfig::default().hot_key(HotKeyConfig {
        threshold: 0,
        ..Default::default()
    });
    let err = config.validate().expect_err("should fail");
    assert!(err.to_string().contains("hot_key.threshold"));
}
