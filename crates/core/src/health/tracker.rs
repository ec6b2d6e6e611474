//! Per-class breaker and health counters
//!
//! Each operation class gets its own [`CircuitBreaker`] and counters on the
//! first call that goes through the breaker. Read-only queries never
//! register a class, so asking about an unknown name leaves the registry
//! untouched and reports a pristine, healthy view.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use docrecover_common::error::{ClassifiedError, FailureKind};
use docrecover_common::resilience::{
    BreakerOpen, CallPermit, CircuitBreaker, CircuitSnapshot, CircuitState, Clock, ConfigResult,
    SystemClock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;

/// Serializable health view of one operation class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub operation_class: String,
    /// True while the class breaker is closed
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    /// Failures recorded since creation or the last reset
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub total_successes: u64,
    pub last_error_kind: Option<FailureKind>,
    pub circuit_state: CircuitState,
    /// When an open breaker admits its next trial call
    pub next_retry_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct HealthStats {
    last_check: Option<DateTime<Utc>>,
    failure_count: u64,
    consecutive_failures: u64,
    total_successes: u64,
    last_error_kind: Option<FailureKind>,
}

#[derive(Debug)]
struct ClassEntry<C: Clock> {
    breaker: CircuitBreaker<C>,
    stats: Mutex<HealthStats>,
}

impl<C: Clock> ClassEntry<C> {
    fn stats(&self) -> MutexGuard<'_, HealthStats> {
        match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(class = %self.breaker.name(), "Health stats lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Breaker and health counters for every operation class
///
/// Entries are created on first use. The registry lock is only held for the
/// lookup; all updates happen under the class's own locks.
pub struct ServiceHealthTracker<C: Clock = SystemClock> {
    entries: RwLock<HashMap<String, Arc<ClassEntry<C>>>>,
    templates: HashMap<String, CircuitBreaker<C>>,
    default_template: CircuitBreaker<C>,
    clock: Arc<C>,
}

impl ServiceHealthTracker<SystemClock> {
    pub fn new(config: &EngineConfig) -> ConfigResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }
}

impl<C: Clock> ServiceHealthTracker<C> {
    pub fn with_clock(config: &EngineConfig, clock: Arc<C>) -> ConfigResult<Self> {
        let default_template = CircuitBreaker::with_clock(
            "default",
            config.default.circuit_breaker.clone(),
            Arc::clone(&clock),
        )?;

        let mut templates = HashMap::new();
        for (class, profile) in &config.classes {
            let breaker = CircuitBreaker::with_clock(
                class.as_str(),
                profile.circuit_breaker.clone(),
                Arc::clone(&clock),
            )?;
            templates.insert(class.clone(), breaker);
        }

        Ok(Self { entries: RwLock::new(HashMap::new()), templates, default_template, clock })
    }

    fn lookup(&self, class: &str) -> Option<Arc<ClassEntry<C>>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(class).map(Arc::clone)
    }

    fn template(&self, class: &str) -> &CircuitBreaker<C> {
        self.templates.get(class).unwrap_or(&self.default_template)
    }

    /// Existing entry for a class, registering it on first use
    fn entry(&self, class: &str) -> Arc<ClassEntry<C>> {
        if let Some(entry) = self.lookup(class) {
            return entry;
        }

        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = entries.entry(class.to_string()).or_insert_with(|| {
            debug!(class, "Registering operation class");
            Arc::new(ClassEntry {
                breaker: self.template(class).sibling(class),
                stats: Mutex::new(HealthStats::default()),
            })
        });
        Arc::clone(entry)
    }

    /// Ask the class breaker for admission of one call
    pub fn try_acquire(&self, class: &str) -> Result<CallPermit, BreakerOpen> {
        self.entry(class).breaker.try_acquire()
    }

    /// Return a permit after a successful call and count the success
    pub fn record_success(&self, class: &str, permit: CallPermit) {
        let entry = self.entry(class);
        entry.breaker.release(permit, true);

        let now = self.clock.to_utc(self.clock.now());
        let mut stats = entry.stats();
        stats.last_check = Some(now);
        stats.consecutive_failures = 0;
        stats.total_successes += 1;
    }

    /// Return a permit after a failed call and remember the failure kind
    pub fn record_failure(&self, class: &str, permit: CallPermit, error: &ClassifiedError) {
        let entry = self.entry(class);
        entry.breaker.release(permit, false);

        let now = self.clock.to_utc(self.clock.now());
        let mut stats = entry.stats();
        stats.last_check = Some(now);
        stats.failure_count += 1;
        stats.consecutive_failures += 1;
        stats.last_error_kind = Some(error.kind());
    }

    /// The breaker guarding a class; clones share its state
    pub fn breaker(&self, class: &str) -> CircuitBreaker<C> {
        self.entry(class).breaker.clone()
    }

    /// Breaker view of a class; unseen classes report a fresh breaker
    pub fn circuit(&self, class: &str) -> CircuitSnapshot {
        match self.lookup(class) {
            Some(entry) => entry.breaker.snapshot(),
            None => self.template(class).sibling(class).snapshot(),
        }
    }

    /// Health view of a class
    pub fn snapshot(&self, class: &str) -> ServiceHealth {
        let Some(entry) = self.lookup(class) else {
            return ServiceHealth {
                operation_class: class.to_string(),
                healthy: true,
                last_check: None,
                failure_count: 0,
                consecutive_failures: 0,
                total_successes: 0,
                last_error_kind: None,
                circuit_state: CircuitState::Closed,
                next_retry_time: None,
            };
        };
        let circuit = entry.breaker.snapshot();
        let stats = entry.stats();

        ServiceHealth {
            operation_class: class.to_string(),
            healthy: circuit.state == CircuitState::Closed,
            last_check: stats.last_check,
            failure_count: stats.failure_count,
            consecutive_failures: stats.consecutive_failures,
            total_successes: stats.total_successes,
            last_error_kind: stats.last_error_kind,
            circuit_state: circuit.state,
            next_retry_time: circuit.next_attempt_at,
        }
    }

    /// Health of every class seen so far, ordered by class name
    pub fn snapshot_all(&self) -> Vec<ServiceHealth> {
        let mut classes = self.classes();
        classes.sort();
        classes.iter().map(|class| self.snapshot(class)).collect()
    }

    /// Classes that have gone through the breaker at least once
    pub fn classes(&self) -> Vec<String> {
        match self.entries.read() {
            Ok(entries) => entries.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        }
    }

    /// Manually close the breaker and clear the counters of one class
    pub fn reset(&self, class: &str) {
        let Some(entry) = self.lookup(class) else {
            debug!(class, "Reset of an unseen class ignored");
            return;
        };
        entry.breaker.reset();
        *entry.stats() = HealthStats::default();
        info!(class, "Service health reset");
    }
}
