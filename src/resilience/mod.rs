//! Retry and circuit breaking around store calls
//!
//! A `ResiliencePolicy` runs an async operation with:
//! - A per-attempt timeout and an overall timeout
//! - Exponential backoff with optional jitter between attempts
//! - A shared circuit breaker that rejects calls while the store is failing

mod circuit_breaker;

pub use circuit_breaker::*;

use crate::config::ResilienceConfig;
use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Policy name used for the search path
pub const SEARCH_POLICY: &str = "search-store";

/// Policy name used for ingestion transactions
pub const INGESTION_POLICY: &str = "ingestion-store";

/// Retry and timeout settings
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceOptions {
    /// Attempts including the first; 1 disables retries
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    pub attempt_timeout: Duration,
    pub total_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl Default for ResilienceOptions {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for ResilienceOptions {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            total_timeout: Duration::from_secs(config.total_timeout_secs),
            breaker: CircuitBreakerConfig {
                failure_ratio: config.failure_ratio,
                minimum_throughput: config.minimum_throughput,
                sampling_duration: Duration::from_secs(config.sampling_duration_secs),
                break_duration: Duration::from_secs(config.break_duration_secs),
            },
        }
    }
}

impl ResilienceOptions {
    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "resilience.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.attempt_timeout.is_zero() {
            return Err(Error::Config(
                "resilience.attempt_timeout_secs must be positive".to_string(),
            ));
        }

        if self.total_timeout < self.attempt_timeout * 2 {
            return Err(Error::Config(
                "resilience.total_timeout_secs must be at least twice attempt_timeout_secs"
                    .to_string(),
            ));
        }

        if self.breaker.sampling_duration < self.attempt_timeout * 2 {
            return Err(Error::Config(
                "resilience.sampling_duration_secs must be at least twice attempt_timeout_secs"
                    .to_string(),
            ));
        }

        if !(self.breaker.failure_ratio > 0.0 && self.breaker.failure_ratio <= 1.0) {
            return Err(Error::Config(
                "resilience.failure_ratio must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.breaker.minimum_throughput == 0 {
            return Err(Error::Config(
                "resilience.minimum_throughput must be at least 1".to_string(),
            ));
        }

        if self.max_delay < self.base_delay {
            return Err(Error::Config(
                "resilience.max_delay_ms must be >= base_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Delay before retry number `retry` (0-based)
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2_f64.powi(retry.min(30) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor) as u64;
        let delay = Duration::from_millis(millis).min(self.max_delay);

        if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.75..=1.25);
            Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64)
        } else {
            delay
        }
    }
}

/// Named retry + circuit breaker policy
#[derive(Debug)]
pub struct ResiliencePolicy {
    name: String,
    options: ResilienceOptions,
    breaker: CircuitBreaker,
}

impl ResiliencePolicy {
    pub fn new(name: impl Into<String>, options: ResilienceOptions) -> Result<Self> {
        options.validate()?;
        let name = name.into();
        Ok(Self {
            breaker: CircuitBreaker::new(name.clone(), options.breaker.clone()),
            name,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ResilienceOptions {
        &self.options
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `operation` under the policy.
    ///
    /// The last error is returned unchanged once attempts are exhausted or
    /// the error is not retryable. Timeouts surface as `Error::Timeout`,
    /// cancellation between attempts as `Error::Cancelled`.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let total = self.options.total_timeout;
        match tokio::time::timeout(total, self.run_attempts(cancel, &mut operation)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(policy = %self.name, "Gave up after {:?}", total);
                Err(Error::Timeout(total))
            }
        }
    }

    async fn run_attempts<T, F, Fut>(&self, cancel: &CancellationToken, operation: &mut F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            // Dropped unsettled (e.g. by the total timeout), the permit counts as a failure
            let permit = self.breaker.try_acquire()?;
            attempt += 1;

            let timeout = self.options.attempt_timeout;
            let outcome = match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(timeout)),
            };

            let error = match outcome {
                Ok(value) => {
                    permit.success();
                    if attempt > 1 {
                        debug!(policy = %self.name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            // Only transient errors are retried and counted against the circuit
            if !error.is_transient() {
                permit.success();
                return Err(error);
            }

            permit.failure();

            if attempt >= self.options.max_attempts {
                warn!(policy = %self.name, attempt, "Giving up: {}", error);
                return Err(error);
            }

            let delay = self.options.backoff_delay(attempt - 1);
            warn!(
                policy = %self.name,
                attempt,
                "Transient failure, retrying in {:?}: {}",
                delay,
                error
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
