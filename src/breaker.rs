//! Circuit breaker guarding the data-source call.
//!
//! Three states: Closed (failures counted), Open (calls short-circuit to
//! the fallback until the reset timeout elapses), HalfOpen (a single probe
//! in flight). All transitions go through compare-and-swap on the state
//! word, so under concurrency only the first caller out of Open wins the
//! probe; everyone else keeps getting the fallback.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::BreakerConfig;
use crate::error::CacheResult;
use crate::types::CircuitState;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

fn state_from_u8(raw: u8) -> CircuitState {
    match raw {
        STATE_OPEN => CircuitState::Open,
        STATE_HALF_OPEN => CircuitState::HalfOpen,
        _ => CircuitState::Closed,
    }
}

/// Observed breaker state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<Instant>,
    pub last_success_time: Option<Instant>,
}

#[derive(Default)]
struct Timestamps {
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    open_since: Option<Instant>,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    times: RwLock<Timestamps>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        info!(
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            enabled = config.enabled,
            "circuit breaker initialized"
        );
        Self {
            config,
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            times: RwLock::new(Timestamps::default()),
        }
    }

    /// Runs `primary` under the breaker; on failure or short circuit the
    /// `fallback` supplies the result.
    pub async fn execute<T, P, FP, FB, FF>(&self, primary: P, fallback: FB) -> T
    where
        P: FnOnce() -> FP,
        FP: Future<Output = CacheResult<T>>,
        FB: FnOnce() -> FF,
        FF: Future<Output = T>,
    {
        if !self.config.enabled {
            return match primary().await {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, "operation failed with breaker disabled");
                    fallback().await
                }
            };
        }

        // Acquire: pairs with the Release stores in the transition methods
        // so a caller observing Open also observes the open_since stamp.
        match state_from_u8(self.state.load(Ordering::Acquire)) {
            CircuitState::Open => {
                if self.reset_timeout_elapsed() {
                    self.attempt_probe(primary, fallback).await
                } else {
                    debug!("circuit open, short-circuiting to fallback");
                    fallback().await
                }
            }
            CircuitState::HalfOpen => self.attempt_probe(primary, fallback).await,
            CircuitState::Closed => match primary().await {
                Ok(value) => {
                    self.on_success();
                    value
                }
                Err(err) => {
                    warn!(error = %err, "operation failed in closed state");
                    self.on_failure();
                    fallback().await
                }
            },
        }
    }

    /// Current state, for observers. Never transitions.
    pub fn state(&self) -> CircuitState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    /// Forces the breaker back to Closed and clears all counters.
    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.times.write().expect("breaker lock poisoned").open_since = None;
        info!("circuit breaker reset to closed");
    }

    pub fn stats(&self) -> BreakerStats {
        let times = self.times.read().expect("breaker lock poisoned");
        BreakerStats {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            last_failure_time: times.last_failure,
            last_success_time: times.last_success,
        }
    }

    async fn attempt_probe<T, P, FP, FB, FF>(&self, primary: P, fallback: FB) -> T
    where
        P: FnOnce() -> FP,
        FP: Future<Output = CacheResult<T>>,
        FB: FnOnce() -> FF,
        FF: Future<Output = T>,
    {
        // Only the first CAS out of Open wins the probe slot; losers land
        // in HalfOpen handling and race the same probe path, which is the
        // behavior the transition table asks for.
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("circuit transitioned to half-open");
        }

        match primary().await {
            Ok(value) => {
                self.on_probe_success();
                value
            }
            Err(err) => {
                warn!(error = %err, "probe failed in half-open state");
                self.on_probe_failure();
                fallback().await
            }
        }
    }

    fn on_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        let mut times = self.times.write().expect("breaker lock poisoned");
        times.last_success = Some(Instant::now());
        // Any success in Closed clears the failure streak.
        self.failure_count.store(0, Ordering::Relaxed);
    }

    fn on_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut times = self.times.write().expect("breaker lock poisoned");
            times.last_failure = Some(Instant::now());
        }

        if failures >= self.config.failure_threshold
            && self
                .state
                .compare_exchange(STATE_CLOSED, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.times.write().expect("breaker lock poisoned").open_since = Some(Instant::now());
            warn!(failures, "circuit transitioned to open");
        }
    }

    fn on_probe_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        let mut times = self.times.write().expect("breaker lock poisoned");
        times.last_success = Some(Instant::now());

        if self
            .state
            .compare_exchange(STATE_HALF_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.failure_count.store(0, Ordering::Relaxed);
            times.open_since = None;
            info!("circuit transitioned to closed after successful probe");
        }
    }

    fn on_probe_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        let mut times = self.times.write().expect("breaker lock poisoned");
        times.last_failure = Some(Instant::now());

        if self
            .state
            .compare_exchange(STATE_HALF_OPEN, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            times.open_since = Some(Instant::now());
            warn!("circuit transitioned back to open after failed probe");
        }
    }

    fn reset_timeout_elapsed(&self) -> bool {
        let times = self.times.read().expect("breaker lock poisoned");
        match times.open_since {
            Some(open_since) => open_since.elapsed() >= self.config.reset_timeout,
            None => true,
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failure_count", &self.failure_count.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::time::Duration;

    fn breaker(threshold: u32, reset_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            enabled: true,
            failure_threshold: threshold,
            reset_timeout,
        })
    }

    async fn fail(breaker: &CircuitBreaker) -> Option<u32> {
        breaker
            .execute(
                || async { Err::<Option<u32>, _>(CacheError::DataSource("down".into())) },
                || async { None },
            )
            .await
    }

    async fn succeed(breaker: &CircuitBreaker, value: u32) -> Option<u32> {
        breaker
            .execute(|| async move { Ok(Some(value)) }, || async { None })
            .await
    }

    #[tokio::test]
    async fn success_passes_through() {
        let breaker = breaker(3, Duration::from_secs(30));
        assert_eq!(succeed(&breaker, 7).await, Some(7));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_at_failure_threshold() {
        let breaker = breaker(3, Duration::from_secs(30));

        for _ in 0..2 {
            assert_eq!(fail(&breaker).await, None);
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        assert_eq!(fail(&breaker).await, None);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_short_circuits_without_calling_primary() {
        let breaker = breaker(1, Duration::from_secs(30));
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let called = std::sync::atomic::AtomicBool::new(false);
        let called = &called;
        let result = breaker
            .execute(
                move || async move {
                    called.store(true, Ordering::SeqCst);
                    Ok(Some(1u32))
                },
                || async { None },
            )
            .await;

        assert_eq!(result, None);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn probe_success_closes_circuit() {
        let breaker = breaker(1, Duration::from_millis(20));
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(succeed(&breaker, 9).await, Some(9));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 0);
    }

    #[tokio::test]
    async fn probe_failure_reopens_circuit() {
        let breaker = breaker(1, Duration::from_millis(20));
        fail(&breaker).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fail(&breaker).await, None);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_failure_streak() {
        let breaker = breaker(3, Duration::from_secs(30));
        fail(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker, 1).await;
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_forces_closed() {
        let breaker = breaker(1, Duration::from_secs(30));
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 0);
    }

    #[tokio::test]
    async fn disabled_breaker_never_opens() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            enabled: false,
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(30),
        });
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(succeed(&breaker, 5).await, Some(5));
    }
}
