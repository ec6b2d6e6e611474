//! Mock operations and observers for testing

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ClassifiedError, FailureKind, Fault};

/// An operation that replays a fixed script of outcomes
///
/// Once the script runs out, the last outcome repeats. Clones share the
/// script and the invocation counter.
///
/// ```
/// use docrecover_common::error::{FailureKind, Fault};
/// use docrecover_common::testing::ScriptedOperation;
///
/// let op = ScriptedOperation::failing_then(2, FailureKind::NetworkTimeout, "done");
/// assert!(op.next_result().is_err());
/// assert!(op.next_result().is_err());
/// assert_eq!(op.next_result().unwrap(), "done");
/// assert_eq!(op.next_result().unwrap(), "done");
/// ```
#[derive(Debug)]
pub struct ScriptedOperation<T> {
    script: Arc<Mutex<VecDeque<Result<T, Fault>>>>,
    last: Arc<Mutex<Option<Result<T, Fault>>>>,
    calls: Arc<AtomicU32>,
}

impl<T> Clone for ScriptedOperation<T> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
            last: Arc::clone(&self.last),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T: Clone + Send + 'static> ScriptedOperation<T> {
    pub fn new(script: Vec<Result<T, Fault>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            last: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail `failures` times with a tagged fault, then succeed with `value`
    pub fn failing_then(failures: usize, kind: FailureKind, value: T) -> Self {
        let mut script: Vec<Result<T, Fault>> = (0..failures)
            .map(|i| Err(Fault::tagged(kind, format!("scripted {kind} #{}", i + 1))))
            .collect();
        script.push(Ok(value));
        Self::new(script)
    }

    /// Always fail with the given fault
    pub fn always_failing(fault: Fault) -> Self {
        Self::new(vec![Err(fault)])
    }

    /// Produce the next scripted outcome and count the invocation
    pub fn next_result(&self) -> Result<T, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last.clone().unwrap_or_else(|| Err(Fault::new("script is empty"))),
        }
    }

    /// Async form, ready to be handed to an executor as `|| op.call()`
    pub fn call(&self) -> impl Future<Output = Result<T, Fault>> + Send + 'static {
        let outcome = self.next_result();
        async move { outcome }
    }

    /// Like [`call`](Self::call) but resolves only after `delay`
    pub fn call_delayed(
        &self,
        delay: Duration,
    ) -> impl Future<Output = Result<T, Fault>> + Send + 'static {
        let outcome = self.next_result();
        async move {
            tokio::time::sleep(delay).await;
            outcome
        }
    }

    pub fn invocations(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Records retry and degradation notifications for later assertions
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    retries: Arc<Mutex<Vec<(u32, FailureKind)>>>,
    degradations: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_retry(&self, attempt: u32, error: &ClassifiedError) {
        self.retries.lock().unwrap().push((attempt, error.kind()));
    }

    pub fn record_degradation(&self, tag: &str) {
        self.degradations.lock().unwrap().push(tag.to_string());
    }

    /// Attempt numbers that triggered a retry, in order
    pub fn retry_attempts(&self) -> Vec<u32> {
        self.retries.lock().unwrap().iter().map(|(attempt, _)| *attempt).collect()
    }

    pub fn retries(&self) -> Vec<(u32, FailureKind)> {
        self.retries.lock().unwrap().clone()
    }

    pub fn degradations(&self) -> Vec<String> {
        self.degradations.lock().unwrap().clone()
    }
}
