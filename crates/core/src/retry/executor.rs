//! Retry executor
//!
//! Runs one operation until it succeeds, its budget is spent, or it fails
//! with a kind that retrying cannot fix.
//!
//! ```text
//! attempt = 1
//! loop:
//!   breaker open?        -> CircuitOpen (never retried)
//!   run operation
//!   ok                   -> record success, return
//!   err                  -> classify, record failure
//!     !retryable or attempt >= min(policy, kind) budget -> return error
//!     on_retry(attempt), sleep(backoff(kind, attempt)), attempt += 1
//! ```

use std::future::Future;
use std::sync::Arc;

use docrecover_common::error::{ErrorClassifier, Fault};
use docrecover_common::resilience::{BackoffPolicy, Clock, RetryPolicy, SystemClock};
use tracing::{debug, instrument, warn};

use super::observer::RecoveryObserver;
use crate::context::RecoveryContext;
use crate::error::RecoveryError;
use crate::health::ServiceHealthTracker;

/// Executes operations with classification, breaker protection and backoff
pub struct RetryExecutor<C: Clock = SystemClock> {
    classifier: ErrorClassifier,
    tracker: Arc<ServiceHealthTracker<C>>,
}

impl<C: Clock> RetryExecutor<C> {
    pub fn new(tracker: Arc<ServiceHealthTracker<C>>) -> Self {
        Self { classifier: ErrorClassifier::new(), tracker }
    }

    pub fn tracker(&self) -> &Arc<ServiceHealthTracker<C>> {
        &self.tracker
    }

    /// Run `operation` under `policy`, starting at attempt 1
    ///
    /// Every classified failure is appended to `context.previous_errors`.
    #[instrument(
        skip_all,
        fields(
            operation_class = %context.operation_class,
            operation_id = %context.operation_id,
            max_attempts = policy.max_attempts
        )
    )]
    pub async fn run<T, F, Fut>(
        &self,
        operation: &mut F,
        policy: &RetryPolicy,
        context: &mut RecoveryContext,
        observers: &[Arc<dyn RecoveryObserver>],
    ) -> Result<T, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Fault>>,
    {
        let backoff = BackoffPolicy::new(policy.clone());
        context.attempt_number = 1;

        loop {
            let attempt = context.attempt_number;
            let error = match self.attempt_once(operation, context).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(open @ RecoveryError::CircuitOpen { .. }) => return Err(open),
                Err(RecoveryError::Failed(error)) => error,
            };

            let budget = policy.max_attempts.min(error.kind().max_attempts());
            if !error.kind().is_retryable() {
                debug!(attempt, kind = %error.kind(), "Failure is not retryable");
                return Err(RecoveryError::Failed(error));
            }
            if attempt >= budget {
                warn!(attempt, budget, kind = %error.kind(), "Retry budget exhausted");
                return Err(RecoveryError::Failed(error));
            }

            let delay = backoff.delay(error.kind(), attempt);
            for observer in observers {
                observer.on_retry(attempt, &error);
            }
            debug!(
                attempt,
                kind = %error.kind(),
                delay_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );

            tokio::time::sleep(delay).await;
            context.attempt_number += 1;
        }
    }

    /// One protected attempt: breaker admission, invocation, bookkeeping
    pub async fn attempt_once<T, F, Fut>(
        &self,
        operation: &mut F,
        context: &mut RecoveryContext,
    ) -> Result<T, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Fault>>,
    {
        let class = context.operation_class.clone();
        let permit = match self.tracker.try_acquire(&class) {
            Ok(permit) => permit,
            Err(open) => {
                warn!(
                    operation_class = %class,
                    retry_after_ms = open.retry_after.as_millis() as u64,
                    "Circuit breaker rejected call"
                );
                return Err(RecoveryError::CircuitOpen {
                    operation_class: class,
                    retry_after: open.retry_after,
                });
            }
        };

        match operation().await {
            Ok(value) => {
                self.tracker.record_success(&class, permit);
                Ok(value)
            }
            Err(fault) => {
                let error = self
                    .classifier
                    .classify(&fault, Some(&context.metadata))
                    .with_context("attempt", context.attempt_number.to_string());
                self.tracker.record_failure(&class, permit, &error);
                context.previous_errors.push(error.clone());
                Err(RecoveryError::Failed(error))
            }
        }
    }
}
