//! Sampling circuit breaker
//!
//! Outcomes are counted in fixed sampling windows. The circuit opens when a
//! window holds at least `minimum_throughput` outcomes and the failure ratio
//! reaches `failure_ratio`. After `break_duration` a single trial is let
//! through; its outcome closes or re-opens the circuit.

use crate::error::{Error, Result};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through
    #[default]
    Closed,
    /// Calls are rejected
    Open,
    /// One trial call is allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_ratio: f64,
    pub minimum_throughput: u32,
    pub sampling_duration: Duration,
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            minimum_throughput: 10,
            sampling_duration: Duration::from_secs(120),
            break_duration: Duration::from_secs(15),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window_start: Instant,
    successes: u32,
    failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerInner {
    fn reset_window(&mut self, now: Instant) {
        self.window_start = now;
        self.successes = 0;
        self.failures = 0;
    }
}

/// Shared, thread-safe circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window_start: Instant::now(),
                successes: 0,
                failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state as callers would observe it
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) if at.elapsed() >= self.config.break_duration => {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    /// Ask permission for one call.
    ///
    /// The returned permit must be settled with [`CircuitPermit::success`]
    /// or [`CircuitPermit::failure`]; dropping it unsettled counts as a
    /// failure.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => {
                if now.duration_since(inner.window_start) >= self.config.sampling_duration {
                    inner.reset_window(now);
                }
                Ok(CircuitPermit::new(self, false))
            }
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| now.duration_since(at))
                    .unwrap_or_default();
                if elapsed >= self.config.break_duration {
                    debug!(circuit = %self.name, "Break elapsed, letting a trial through");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(CircuitPermit::new(self, true))
                } else {
                    Err(Error::CircuitOpen(self.name.clone()))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(Error::CircuitOpen(self.name.clone()))
                } else {
                    inner.trial_in_flight = true;
                    Ok(CircuitPermit::new(self, true))
                }
            }
        }
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::HalfOpen if trial => {
                info!(circuit = %self.name, "Trial succeeded, closing circuit");
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.trial_in_flight = false;
                inner.reset_window(now);
            }
            CircuitState::Closed => inner.successes += 1,
            // Late outcomes of calls admitted before the circuit opened
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::HalfOpen if trial => {
                warn!(circuit = %self.name, "Trial failed, re-opening circuit");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trial_in_flight = false;
            }
            CircuitState::Closed => {
                inner.failures += 1;
                let total = inner.successes + inner.failures;
                let ratio = f64::from(inner.failures) / f64::from(total);
                if total >= self.config.minimum_throughput && ratio >= self.config.failure_ratio {
                    warn!(
                        circuit = %self.name,
                        failures = inner.failures,
                        total,
                        "Failure ratio {:.2} reached, opening circuit for {:?}",
                        ratio,
                        self.config.break_duration
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.reset_window(now);
                }
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }
}

/// Admission for one call through a [`CircuitBreaker`]
#[must_use = "an unsettled permit counts as a failure"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CircuitPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this call is the half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(circuit = %self.breaker.name, trial = self.trial, "Call abandoned, counting as failure");
            self.breaker.record_failure(self.trial);
        }
    }
}
