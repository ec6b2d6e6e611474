//! Reduced-capability fallbacks once recovery has failed
//!
//! | condition | mode |
//! |-----------|------|
//! | memory-exhausted, worker-crashed, worker-init-failed, breaker open | queued-processing |
//! | class `convert` | static-view |
//! | class `fetch-pages` | direct-view |
//! | any other class | download-only |
//!
//! Kinds that no layer can recover (permission-denied, document-corrupted,
//! worker-init-failed not raised by a worker pool) are never degraded.

use docrecover_common::error::FailureKind;
use docrecover_common::impl_status_conversions;
use serde_json::json;
use tracing::info;

use crate::config::classes;
use crate::context::{RecoveryContext, RecoveryResult};
use crate::error::RecoveryError;
use crate::worker::ports::WORKER_POOL_CONTEXT_KEY;

/// Fallback behavior offered to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DegradationMode {
    /// Serve the original document without conversion
    StaticView,
    /// Serve the document directly instead of paginated pages
    DirectView,
    /// Only offer the raw file for download
    DownloadOnly,
    /// Accept the request and process it later
    QueuedProcessing,
}

impl_status_conversions!(DegradationMode {
    StaticView => "static-view",
    DirectView => "direct-view",
    DownloadOnly => "download-only",
    QueuedProcessing => "queued-processing",
});

impl DegradationMode {
    /// Tag reported in `RecoveryResult::strategy_used`
    pub fn strategy_tag(self) -> String {
        format!("degraded-{self}")
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::StaticView => {
                "Document conversion is unavailable. Showing the original document instead."
            }
            Self::DirectView => {
                "Page previews are unavailable. Showing the full document directly."
            }
            Self::DownloadOnly => {
                "The document viewer is unavailable. You can still download the file."
            }
            Self::QueuedProcessing => {
                "The service is busy. Your document has been queued and will be ready shortly."
            }
        }
    }
}

/// Picks and builds the fallback result for a failed call
#[derive(Debug, Clone, Copy, Default)]
pub struct DegradationController;

impl DegradationController {
    pub fn new() -> Self {
        Self
    }

    /// Fallback mode for a failure, or `None` when it must not be degraded
    pub fn select(&self, error: &RecoveryError, operation_class: &str) -> Option<DegradationMode> {
        if error.is_circuit_open() {
            return Some(DegradationMode::QueuedProcessing);
        }

        let kind = error.kind();
        match kind {
            FailureKind::MemoryExhausted | FailureKind::WorkerCrashed => {
                return Some(DegradationMode::QueuedProcessing);
            }
            // Only a pool that ran out of restarts is overloaded; anything else
            // that failed to start will not start later either
            FailureKind::WorkerInitFailed => {
                let from_pool = error
                    .classified()
                    .and_then(|e| e.context_value(WORKER_POOL_CONTEXT_KEY))
                    .is_some();
                return from_pool.then_some(DegradationMode::QueuedProcessing);
            }
            _ if !kind.is_recoverable() => return None,
            _ => {}
        }

        Some(match operation_class {
            classes::CONVERT => DegradationMode::StaticView,
            classes::FETCH_PAGES => DegradationMode::DirectView,
            _ => DegradationMode::DownloadOnly,
        })
    }

    /// Build the degraded result, or `None` when degradation does not apply
    pub fn degrade(&self, error: &RecoveryError, context: &RecoveryContext) -> Option<RecoveryResult> {
        let mode = self.select(error, &context.operation_class)?;

        info!(
            operation_class = %context.operation_class,
            operation_id = %context.operation_id,
            kind = %error.kind(),
            %mode,
            "Serving degraded result"
        );

        let data = json!({
            "mode": mode.to_string(),
            "operation_class": context.operation_class,
            "operation_id": context.operation_id.to_string(),
            "reason": error.kind().code(),
        });
        Some(RecoveryResult::degraded(mode.strategy_tag(), mode.user_message(), data))
    }
}
