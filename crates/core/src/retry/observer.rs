//! Callbacks fired while a call is being recovered

use std::fmt;

use docrecover_common::error::ClassifiedError;
use docrecover_common::testing::RecordingObserver;

/// Receives retry and degradation notifications
///
/// Both methods default to no-ops so observers only implement what they
/// need. They run inline on the calling task and must not block.
pub trait RecoveryObserver: Send + Sync {
    /// Fired before sleeping ahead of the next attempt
    fn on_retry(&self, _attempt: u32, _error: &ClassifiedError) {}

    /// Fired when a call ends in a degraded result
    fn on_degradation(&self, _strategy: &str) {}
}

/// Observer built from a retry closure
pub struct FnObserver<F> {
    on_retry: F,
}

impl<F> FnObserver<F>
where
    F: Fn(u32, &ClassifiedError) + Send + Sync,
{
    pub fn new(on_retry: F) -> Self {
        Self { on_retry }
    }
}

impl<F> fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").finish_non_exhaustive()
    }
}

impl<F> RecoveryObserver for FnObserver<F>
where
    F: Fn(u32, &ClassifiedError) + Send + Sync,
{
    fn on_retry(&self, attempt: u32, error: &ClassifiedError) {
        (self.on_retry)(attempt, error);
    }
}

impl RecoveryObserver for RecordingObserver {
    fn on_retry(&self, attempt: u32, error: &ClassifiedError) {
        self.record_retry(attempt, error);
    }

    fn on_degradation(&self, strategy: &str) {
        self.record_degradation(strategy);
    }
}
