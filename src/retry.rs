//! Retry policy: exponential back-off executor and error dispositions.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{CacheResult, ErrorKind};

/// What to do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorDisposition {
    /// Retry after the given delay.
    Retry { delay: Duration },
    /// Surface immediately; retrying will not help.
    NoRetry,
    /// Serve the degraded fallback value.
    Fallback,
    /// Count against the circuit breaker.
    CircuitBreak,
}

/// Runs operations under the configured retry policy.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether failures of this kind are worth retrying.
    #[inline]
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.config.retryable_errors.contains(&kind)
    }

    /// Delay before attempt `attempt + 1`:
    /// `min(initial * multiplier^(attempt - 1), max_delay)`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.config.initial_delay;
        }
        let millis = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(attempt as i32 - 1);
        let capped = (millis as u64).min(self.config.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Classifies a failure into a disposition. Data-source failures count
    /// against the breaker; retryable kinds get a first-attempt delay;
    /// everything else is terminal.
    pub fn classify(&self, kind: ErrorKind) -> ErrorDisposition {
        if kind == ErrorKind::DataSource {
            return ErrorDisposition::CircuitBreak;
        }
        if self.is_retryable(kind) {
            return ErrorDisposition::Retry {
                delay: self.retry_delay(1),
            };
        }
        ErrorDisposition::NoRetry
    }

    /// Runs `operation` up to `max_attempts` times, sleeping the back-off
    /// between attempts. Failures whose kind is not retryable surface on
    /// the first attempt. The sleep is a plain tokio sleep and terminates
    /// with the caller's future on cancellation.
    pub async fn execute<T, Op, Fut>(&self, mut operation: Op) -> CacheResult<T>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %err,
                        "operation failed"
                    );
                    if !self.is_retryable(err.kind()) || attempt >= self.config.max_attempts {
                        return Err(err);
                    }
                    let delay = self.retry_delay(attempt);
                    debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Like [`execute`](Self::execute) but serves `fallback` on terminal
    /// failure instead of surfacing the error.
    pub async fn execute_with_fallback<T, Op, Fut>(&self, operation: Op, fallback: T) -> T
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        match self.execute(operation).await {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "all retries failed, serving fallback");
                fallback
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
