//! Errors produced by the recovery pipeline

use std::time::Duration;

use docrecover_common::error::{ClassifiedError, FailureKind, FailureVariant};
use thiserror::Error;

/// Failure of one pass through the retry executor
///
/// A breaker rejection is kept apart from classified failures: it is never
/// retried and no operation was invoked to produce it.
#[derive(Debug, Clone, Error)]
pub enum RecoveryError {
    /// The operation ran and failed
    #[error(transparent)]
    Failed(#[from] ClassifiedError),

    /// The class breaker rejected the call before the operation ran
    #[error("Circuit breaker open for '{operation_class}', retry in {retry_after:?}")]
    CircuitOpen { operation_class: String, retry_after: Duration },
}

impl RecoveryError {
    /// Failure kind used for strategy matching and degradation
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Failed(error) => error.kind(),
            Self::CircuitOpen { .. } => FailureKind::NetworkUnavailable,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Failed(error) => Some(error),
            Self::CircuitOpen { .. } => None,
        }
    }

    /// Turn into the error handed back to callers
    ///
    /// A breaker rejection becomes network-unavailable with the
    /// `CircuitOpen` variant so the user message explains the pause.
    pub fn into_classified(self) -> ClassifiedError {
        match self {
            Self::Failed(error) => error,
            Self::CircuitOpen { operation_class, retry_after } => ClassifiedError::new(
                FailureKind::NetworkUnavailable,
                format!("circuit breaker open for '{operation_class}'"),
            )
            .with_variant(FailureVariant::CircuitOpen)
            .with_context("operation_class", operation_class)
            .with_context("retry_after_ms", retry_after.as_millis().to_string()),
        }
    }
}
