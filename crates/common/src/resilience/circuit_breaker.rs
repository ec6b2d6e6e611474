//! Circuit breaker for one operation class
//!
//! The breaker prevents cascading failures by counting consecutive failures
//! and failing fast while a dependency is unhealthy.
//!
//! ```text
//!            failures >= failure_threshold
//!   Closed ─────────────────────────────────▶ Open
//!     ▲                                        │ now >= next_attempt_at
//!     │ successes >= success_threshold         ▼
//!     └────────────────────────────────── HalfOpen ──(any failure)──▶ Open
//! ```
//!
//! All counters and timestamps live behind a single mutex so concurrent
//! callers of the same class never lose updates. Unrelated classes use
//! separate breakers and never contend.
//!
//! # Admission
//!
//! Callers either wrap the call with [`CircuitBreaker::execute`], or drive
//! the breaker by hand:
//!
//! ```rust
//! use docrecover_common::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("convert", CircuitBreakerConfig::default()).unwrap();
//! match breaker.try_acquire() {
//!     Ok(permit) => {
//!         let succeeded = true; // run the call here
//!         breaker.release(permit, succeeded);
//!     }
//!     Err(open) => println!("rejected, retry in {:?}", open.retry_after),
//! }
//! ```
//!
//! # Half-open trials
//!
//! Once the open-state timeout has elapsed, the next `try_acquire` moves the
//! breaker to half-open and hands out at most `half_open_max_calls` trial
//! permits. Trial permits are tied to the half-open period that issued them:
//! a permit from an earlier period never frees a slot of a later one, and a
//! trial permit dropped without being released reopens the breaker.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::policy::{ConfigError, ConfigResult};
use crate::utils::serde::duration_millis;

/// Errors returned by [`CircuitBreaker::execute`]
#[derive(Debug, Error)]
pub enum ResilienceError<E: fmt::Debug> {
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker is open, retry in {retry_after:?}")]
    CircuitOpen {
        /// Time until the next trial call; zero while trial slots are taken
        retry_after: Duration,
    },

    /// The underlying operation failed
    #[error("Operation failed: {0:?}")]
    OperationFailed(E),
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Rejection returned by [`CircuitBreaker::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Circuit breaker is open, retry in {retry_after:?}")]
pub struct BreakerOpen {
    /// Time left until the breaker admits a trial call
    pub retry_after: Duration,
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, admitting trial requests
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u64,
    /// Consecutive successes needed to close the circuit from half-open
    pub success_threshold: u64,
    /// Time to wait before transitioning from open to half-open
    #[serde(with = "duration_millis", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Maximum number of trial calls in flight while half-open
    pub half_open_max_calls: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be greater than 0"));
        }

        if self.half_open_max_calls == 0 {
            return Err(ConfigError::invalid("half_open_max_calls must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
///
/// Starts from the defaults (5 failures, 2 successes, 60 s, 1 trial) and
/// validates on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Builder seeded with the default configuration
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    /// Consecutive failures that open a closed breaker
    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Consecutive trial successes that close a half-open breaker
    pub fn success_threshold(mut self, threshold: u64) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// How long an open breaker rejects calls before admitting a trial
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Trial calls allowed in flight at once while half-open
    pub fn half_open_max_calls(mut self, max_calls: u64) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any threshold is zero.
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time view of a breaker for monitoring
///
/// Timestamps are monotonic instants from the breaker's [`Clock`]; use
/// [`CircuitBreaker::snapshot`] for wall-clock values.
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    /// Failures since the last success or close
    pub consecutive_failures: u64,
    /// Successes since the last failure; drives half-open → closed
    pub consecutive_successes: u64,
    /// Trial permits currently handed out
    pub half_open_in_flight: u64,
    /// Admitted calls since creation
    pub total_calls: u64,
    /// Calls turned away while open or while trial slots were taken
    pub rejected_calls: u64,
    pub opened_at: Option<Instant>,
    /// When an open breaker admits its next trial
    pub next_attempt_at: Option<Instant>,
    pub last_failure_time: Option<Instant>,
    pub state_change_time: Instant,
}

/// Serializable breaker view with wall-clock timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    /// Operation class the breaker guards
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u64,
    pub consecutive_successes: u64,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub opened_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Admission ticket returned by [`CircuitBreaker::try_acquire`]
///
/// Hand it back through [`CircuitBreaker::release`] once the call finished.
///
/// A half-open trial permit that is dropped without being released (the
/// caller's future was cancelled, a surrounding timeout fired) counts as a
/// failed trial: the breaker reopens and the trial slot is freed, so the
/// next deadline admits a new trial.
#[must_use = "a permit must be released with the call outcome"]
pub struct CallPermit {
    trial: Option<TrialSlot>,
}

impl CallPermit {
    /// Whether this call is a half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl fmt::Debug for CallPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPermit")
            .field("trial", &self.trial.as_ref().map(|slot| slot.generation))
            .finish()
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if let Some(slot) = self.trial.take() {
            slot.abandon();
        }
    }
}

/// Claim on one half-open trial slot of a specific half-open period
struct TrialSlot {
    breaker: Arc<str>,
    inner: Arc<Mutex<BreakerInner>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    generation: u64,
}

impl TrialSlot {
    /// Give the slot back after the call was abandoned
    fn abandon(self) {
        let now = self.clock.now();
        let mut inner = lock_state(&self.inner, &self.breaker);

        // A later half-open period owns the counters now
        if inner.state != CircuitState::HalfOpen || inner.generation != self.generation {
            return;
        }

        inner.last_failure_time = Some(now);
        inner.consecutive_failures += 1;
        inner.trip(now, self.timeout);
        warn!(breaker = %self.breaker, "Trial call abandoned, circuit breaker reopened");
    }
}

fn lock_state<'a>(inner: &'a Mutex<BreakerInner>, name: &str) -> MutexGuard<'a, BreakerInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(breaker = %name, "Circuit breaker lock poisoned, recovering state");
            poisoned.into_inner()
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u64,
    consecutive_successes: u64,
    half_open_in_flight: u64,
    total_calls: u64,
    rejected_calls: u64,
    opened_at: Option<Instant>,
    next_attempt_at: Option<Instant>,
    last_failure_time: Option<Instant>,
    state_change_time: Instant,
    /// Incremented on every transition into half-open
    generation: u64,
}

impl BreakerInner {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            half_open_in_flight: 0,
            total_calls: 0,
            rejected_calls: 0,
            opened_at: None,
            next_attempt_at: None,
            last_failure_time: None,
            state_change_time: now,
            generation: 0,
        }
    }

    fn trip(&mut self, now: Instant, timeout: Duration) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.next_attempt_at = Some(now + timeout);
        self.consecutive_successes = 0;
        self.half_open_in_flight = 0;
        self.state_change_time = now;
    }

    fn close(&mut self, now: Instant) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.half_open_in_flight = 0;
        self.opened_at = None;
        self.next_attempt_at = None;
        self.state_change_time = now;
    }
}

/// Circuit breaker guarding one operation class
///
/// Clones share state, so a clone handed to another task observes and
/// updates the same breaker.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .field("consecutive_successes", &inner.consecutive_successes)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom (shared) clock
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<C>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let now = clock.now();

        Ok(Self {
            name: Arc::from(name.into()),
            config,
            inner: Arc::new(Mutex::new(BreakerInner::new(now))),
            clock,
        })
    }

    /// A new breaker sharing this one's configuration and clock, with fresh
    /// state
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        let now = self.clock.now();
        Self {
            name: Arc::from(name.into()),
            config: self.config.clone(),
            inner: Arc::new(Mutex::new(BreakerInner::new(now))),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Operation class this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Thresholds and timeout in effect
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        lock_state(&self.inner, &self.name)
    }

    /// Ask for admission of one call
    ///
    /// An open breaker whose deadline has passed moves to half-open here,
    /// before the call is admitted.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerOpen`] while the breaker is open, or while every
    /// half-open trial slot is taken (`retry_after` is zero then).
    pub fn try_acquire(&self) -> Result<CallPermit, BreakerOpen> {
        let now = self.clock.now();
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            match inner.next_attempt_at {
                Some(deadline) if now < deadline => {
                    inner.rejected_calls += 1;
                    return Err(BreakerOpen { retry_after: deadline - now });
                }
                _ => {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    inner.half_open_in_flight = 0;
                    inner.state_change_time = now;
                    inner.generation += 1;
                    info!(breaker = %self.name, "Circuit breaker half-open, admitting trial call");
                }
            }
        }

        match inner.state {
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight >= self.config.half_open_max_calls {
                    inner.rejected_calls += 1;
                    return Err(BreakerOpen { retry_after: Duration::ZERO });
                }
                inner.half_open_in_flight += 1;
                inner.total_calls += 1;
                let clock: Arc<dyn Clock> = self.clock.clone();
                Ok(CallPermit {
                    trial: Some(TrialSlot {
                        breaker: Arc::clone(&self.name),
                        inner: Arc::clone(&self.inner),
                        clock,
                        timeout: self.config.timeout,
                        generation: inner.generation,
                    }),
                })
            }
            _ => {
                inner.total_calls += 1;
                Ok(CallPermit { trial: None })
            }
        }
    }

    /// Return a permit together with the outcome of its call
    ///
    /// A trial permit from an earlier half-open period no longer holds a
    /// slot; its outcome is still recorded.
    pub fn release(&self, mut permit: CallPermit, success: bool) {
        let now = self.clock.now();
        let trial = permit.trial.take();
        let mut inner = self.lock();

        if let Some(slot) = trial {
            if inner.state == CircuitState::HalfOpen && inner.generation == slot.generation {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }
        }

        if success {
            self.apply_success(&mut inner, now);
        } else {
            self.apply_failure(&mut inner, now);
        }
    }

    /// Record a successful operation that did not go through a permit
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.apply_success(&mut inner, now);
    }

    /// Record a failed operation that did not go through a permit
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.apply_failure(&mut inner, now);
    }

    fn apply_success(&self, inner: &mut BreakerInner, now: Instant) {
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.consecutive_successes += 1;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    let successes = inner.consecutive_successes;
                    inner.close(now);
                    info!(breaker = %self.name, successes, "Circuit breaker closed");
                }
            }
            CircuitState::Open => {
                debug!(breaker = %self.name, "Late success ignored while circuit is open");
            }
        }
    }

    fn apply_failure(&self, inner: &mut BreakerInner, now: Instant) {
        inner.last_failure_time = Some(now);
        inner.consecutive_successes = 0;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.trip(now, self.config.timeout);
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                inner.trip(now, self.config.timeout);
                warn!(breaker = %self.name, "Circuit breaker reopened after half-open failure");
            }
            CircuitState::Open => {
                inner.consecutive_failures += 1;
            }
        }
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// While open, the operation is not invoked at all. Dropping the
    /// returned future mid-call releases a trial slot as a failure.
    ///
    /// # Errors
    ///
    /// [`ResilienceError::CircuitOpen`] when rejected,
    /// [`ResilienceError::OperationFailed`] with the operation's own error.
    #[instrument(skip(self, operation), fields(breaker = %self.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Debug,
    {
        let permit = match self.try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                debug!("Circuit breaker rejecting call");
                return Err(ResilienceError::CircuitOpen { retry_after: open.retry_after });
            }
        };

        match operation().await {
            Ok(result) => {
                self.release(permit, true);
                Ok(result)
            }
            Err(error) => {
                self.release(permit, false);
                Err(ResilienceError::OperationFailed(error))
            }
        }
    }

    /// Current state, without triggering the open → half-open transition
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Fast check if the breaker would currently admit a call
    pub fn is_available(&self) -> bool {
        let now = self.clock.now();
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner.next_attempt_at.is_some_and(|deadline| now >= deadline),
            CircuitState::HalfOpen => inner.half_open_in_flight < self.config.half_open_max_calls,
        }
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            half_open_in_flight: inner.half_open_in_flight,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            opened_at: inner.opened_at,
            next_attempt_at: inner.next_attempt_at,
            last_failure_time: inner.last_failure_time,
            state_change_time: inner.state_change_time,
        }
    }

    /// Get a serializable snapshot for health reporting
    pub fn snapshot(&self) -> CircuitSnapshot {
        let metrics = self.metrics();
        CircuitSnapshot {
            name: self.name.to_string(),
            state: metrics.state,
            consecutive_failures: metrics.consecutive_failures,
            consecutive_successes: metrics.consecutive_successes,
            total_calls: metrics.total_calls,
            rejected_calls: metrics.rejected_calls,
            opened_at: metrics.opened_at.map(|at| self.clock.to_utc(at)),
            next_attempt_at: metrics.next_attempt_at.map(|at| self.clock.to_utc(at)),
        }
    }

    /// The clock this breaker reads time from
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.close(now);
        inner.last_failure_time = None;
        info!(breaker = %self.name, "Circuit breaker manually reset to closed state");
    }
}
