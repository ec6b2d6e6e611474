//! Failure taxonomy and classification for document operations
//!
//! # Error Handling Architecture
//!
//! The error handling system is built on four pieces:
//!
//! 1. **[`Fault`]**: the raw failure an operation returns. It may carry
//!    structured hints (a pre-tagged kind, an error name, a status code) or
//!    nothing but a message.
//!
//! 2. **[`ErrorClassifier`]**: a deterministic, side-effect-free mapping from
//!    a `Fault` to a closed [`FailureKind`].
//!
//! 3. **[`ClassifiedError`]**: the immutable, typed result of
//!    classification. Its kind is never changed afterwards.
//!
//! 4. **[`ErrorClassification`] trait**: a standard interface for querying
//!    retryability, recoverability and severity.
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Low** | Expected, self-healing | Expired URL, cache miss |
//! | **Medium** | Transient | Timeouts, pages still generating |
//! | **High** | Needs a recovery layer | Service unavailable, worker crash |
//! | **Critical** | Cannot be fixed by retrying | Corruption, OOM, worker start failure |
//!
//! ## Example
//!
//! ```rust
//! use docrecover_common::error::{ErrorClassifier, FailureKind, Fault};
//!
//! let classifier = ErrorClassifier::new();
//! let error = classifier.classify(&Fault::new("Request timed out"), None);
//! assert_eq!(error.kind(), FailureKind::NetworkTimeout);
//! assert!(!error.user_message().is_empty());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod classified;
pub mod classifier;
pub mod fault;
pub mod kind;

pub use classified::ClassifiedError;
pub use classifier::ErrorClassifier;
pub use fault::{Fault, SharedCause};
pub use kind::{FailureFamily, FailureKind, FailureVariant};

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Check if re-running the failed operation unchanged may succeed
    fn is_retryable(&self) -> bool;

    /// Check if any recovery layer (strategies, degradation) may help
    fn is_recoverable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}

impl ErrorClassification for FailureKind {
    fn is_retryable(&self) -> bool {
        FailureKind::is_retryable(*self)
    }

    fn is_recoverable(&self) -> bool {
        FailureKind::is_recoverable(*self)
    }

    fn severity(&self) -> ErrorSeverity {
        FailureKind::severity(*self)
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected and usually self-healing
    Low,
    /// Transient, should be monitored
    Medium,
    /// Requires a recovery layer to act
    High,
    /// Immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
