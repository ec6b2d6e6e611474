//! Closed failure taxonomy for document fetch/convert/render operations
//!
//! Every attribute on [`FailureKind`] is a pure function of the variant. The
//! tables below are the single source of truth for severity, retry budgets
//! and user-facing text; nothing mutates them per instance.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ErrorSeverity;

/// Closed set of failure kinds produced by classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The remote side did not answer in time
    NetworkTimeout,
    /// Generic transport failure (reset, refused, failed fetch)
    NetworkFailure,
    /// The device or the upstream service is offline
    NetworkUnavailable,
    /// A time-limited access URL is no longer valid
    UrlExpired,
    /// Cached pages were expected but absent
    CacheMiss,
    /// Converted pages are not (yet) available
    PagesNotFound,
    /// Conversion or rendering of the document failed
    ConversionFailed,
    /// Access was refused (CORS, ACL, password protection)
    PermissionDenied,
    /// The document bytes are damaged
    DocumentCorrupted,
    /// A render worker died while serving a call
    WorkerCrashed,
    /// A render worker could not be started
    WorkerInitFailed,
    /// The host ran out of memory
    MemoryExhausted,
    /// Anything the classifier could not place
    Unknown,
}

/// Coarse grouping of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureFamily {
    /// Transport level failures
    Network,
    /// Credentials, URLs and permissions
    Access,
    /// Problems with the document or its derived pages
    Content,
    /// Workers, memory and everything unclassified
    Infrastructure,
}

/// Optional refinement recorded alongside a [`FailureKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureVariant {
    /// Cross-origin rejection
    Cors,
    /// Password protected or encrypted document
    Password,
    /// Not a valid or supported document format
    InvalidFormat,
    /// Rendering (canvas) failure
    Render,
    /// Generic allocation failure rather than outright exhaustion
    Allocation,
    /// Rejected by an open circuit breaker
    CircuitOpen,
    /// Exceeded the per-call operation timeout
    OperationTimeout,
}

impl FailureKind {
    /// All kinds, in declaration order
    pub const ALL: [FailureKind; 13] = [
        FailureKind::NetworkTimeout,
        FailureKind::NetworkFailure,
        FailureKind::NetworkUnavailable,
        FailureKind::UrlExpired,
        FailureKind::CacheMiss,
        FailureKind::PagesNotFound,
        FailureKind::ConversionFailed,
        FailureKind::PermissionDenied,
        FailureKind::DocumentCorrupted,
        FailureKind::WorkerCrashed,
        FailureKind::WorkerInitFailed,
        FailureKind::MemoryExhausted,
        FailureKind::Unknown,
    ];

    /// Stable kebab-case code, identical to the serde representation
    pub fn code(self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network-timeout",
            Self::NetworkFailure => "network-failure",
            Self::NetworkUnavailable => "network-unavailable",
            Self::UrlExpired => "url-expired",
            Self::CacheMiss => "cache-miss",
            Self::PagesNotFound => "pages-not-found",
            Self::ConversionFailed => "conversion-failed",
            Self::PermissionDenied => "permission-denied",
            Self::DocumentCorrupted => "document-corrupted",
            Self::WorkerCrashed => "worker-crashed",
            Self::WorkerInitFailed => "worker-init-failed",
            Self::MemoryExhausted => "memory-exhausted",
            Self::Unknown => "unknown",
        }
    }

    /// Group used for reporting: network, access, content or infrastructure
    pub fn family(self) -> FailureFamily {
        match self {
            Self::NetworkTimeout | Self::NetworkFailure | Self::NetworkUnavailable => {
                FailureFamily::Network
            }
            Self::UrlExpired | Self::PermissionDenied => FailureFamily::Access,
            Self::CacheMiss
            | Self::PagesNotFound
            | Self::ConversionFailed
            | Self::DocumentCorrupted => FailureFamily::Content,
            Self::WorkerCrashed | Self::WorkerInitFailed | Self::MemoryExhausted | Self::Unknown => {
                FailureFamily::Infrastructure
            }
        }
    }

    /// How badly the failure affects the user
    ///
    /// Kinds that end the session for this document (corrupted file, no
    /// renderer, no memory) are critical.
    pub fn severity(self) -> ErrorSeverity {
        match self {
            Self::UrlExpired | Self::CacheMiss => ErrorSeverity::Low,
            Self::NetworkTimeout | Self::NetworkFailure | Self::PagesNotFound | Self::Unknown => {
                ErrorSeverity::Medium
            }
            Self::NetworkUnavailable
            | Self::ConversionFailed
            | Self::PermissionDenied
            | Self::WorkerCrashed => ErrorSeverity::High,
            Self::DocumentCorrupted | Self::WorkerInitFailed | Self::MemoryExhausted => {
                ErrorSeverity::Critical
            }
        }
    }

    /// Whether some layer (strategy chain or degradation) can still help
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::PermissionDenied | Self::DocumentCorrupted | Self::WorkerInitFailed)
    }

    /// Whether re-running the same operation unchanged may succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout
                | Self::NetworkFailure
                | Self::NetworkUnavailable
                | Self::PagesNotFound
                | Self::ConversionFailed
                | Self::WorkerCrashed
                | Self::Unknown
        )
    }

    /// Kind-specific attempt budget (including the first attempt)
    pub fn max_attempts(self) -> u32 {
        match self {
            Self::NetworkTimeout | Self::NetworkFailure | Self::NetworkUnavailable => 5,
            Self::PagesNotFound | Self::WorkerCrashed => 3,
            Self::ConversionFailed | Self::Unknown => 2,
            Self::UrlExpired
            | Self::CacheMiss
            | Self::PermissionDenied
            | Self::DocumentCorrupted
            | Self::WorkerInitFailed
            | Self::MemoryExhausted => 1,
        }
    }

    /// Multiplier applied to the base backoff delay
    ///
    /// Timeouts and unavailable services wait longer; crashed render workers
    /// are retried quickly because a fresh worker is already spawned.
    pub fn backoff_multiplier(self) -> f64 {
        match self {
            Self::NetworkTimeout => 1.5,
            Self::NetworkUnavailable | Self::PagesNotFound | Self::ConversionFailed => 2.0,
            Self::WorkerCrashed => 0.5,
            Self::MemoryExhausted => 3.0,
            Self::NetworkFailure
            | Self::UrlExpired
            | Self::CacheMiss
            | Self::PermissionDenied
            | Self::DocumentCorrupted
            | Self::WorkerInitFailed
            | Self::Unknown => 1.0,
        }
    }

    /// Plain-language explanation, safe to show without further context
    pub fn user_message(self) -> &'static str {
        match self {
            Self::NetworkTimeout => "The document server took too long to respond.",
            Self::NetworkFailure => "A network error interrupted loading the document.",
            Self::NetworkUnavailable => "The document service is currently unreachable.",
            Self::UrlExpired => "The link to this document has expired.",
            Self::CacheMiss => "The cached copy of this document is missing.",
            Self::PagesNotFound => "The pages for this document are not available yet.",
            Self::ConversionFailed => "The document could not be converted for viewing.",
            Self::PermissionDenied => "You do not have permission to open this document.",
            Self::DocumentCorrupted => "The document appears to be damaged.",
            Self::WorkerCrashed => "The document renderer stopped unexpectedly.",
            Self::WorkerInitFailed => "The document renderer could not be started.",
            Self::MemoryExhausted => "There is not enough memory to display this document.",
            Self::Unknown => "Something went wrong while loading the document.",
        }
    }

    /// What the user can do about it
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your connection and try again in a moment.",
            Self::NetworkFailure => "Check your internet connection and reload the page.",
            Self::NetworkUnavailable => "Wait a few minutes and try again.",
            Self::UrlExpired => "Reload the page to get a fresh link.",
            Self::CacheMiss => "Reload the document to rebuild its pages.",
            Self::PagesNotFound => "Wait for processing to finish, then reload.",
            Self::ConversionFailed => "Download the original file or upload it again.",
            Self::PermissionDenied => "Ask the document owner for access, or sign in again.",
            Self::DocumentCorrupted => "Upload a fresh copy of the original file.",
            Self::WorkerCrashed => "Reload the page to restart the renderer.",
            Self::WorkerInitFailed => "Close other tabs or restart your browser, then retry.",
            Self::MemoryExhausted => "Close other documents or download the file instead.",
            Self::Unknown => "Try again later. If the problem persists, contact support.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FailureVariant {
    /// Stable kebab-case code
    pub fn code(self) -> &'static str {
        match self {
            Self::Cors => "cors",
            Self::Password => "password",
            Self::InvalidFormat => "invalid-format",
            Self::Render => "render",
            Self::Allocation => "allocation",
            Self::CircuitOpen => "circuit-open",
            Self::OperationTimeout => "operation-timeout",
        }
    }
}

impl fmt::Display for FailureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_serde_names() {
        for kind in FailureKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.code()));
        }
    }

    /// Non-recoverable kinds must never be retryable; retrying them would
    /// only delay the inevitable surface to the user.
    #[test]
    fn test_non_recoverable_kinds_are_not_retryable() {
        for kind in FailureKind::ALL {
            if !kind.is_recoverable() {
                assert!(!kind.is_retryable(), "{kind} should not be retryable");
                assert_eq!(kind.max_attempts(), 1);
            }
        }
    }

    #[test]
    fn test_retryable_kinds_have_a_retry_budget() {
        for kind in FailureKind::ALL.into_iter().filter(|k| k.is_retryable()) {
            assert!(kind.max_attempts() > 1, "{kind} needs at least one retry");
        }
    }

    #[test]
    fn test_families() {
        assert_eq!(FailureKind::NetworkTimeout.family(), FailureFamily::Network);
        assert_eq!(FailureKind::UrlExpired.family(), FailureFamily::Access);
        assert_eq!(FailureKind::CacheMiss.family(), FailureFamily::Content);
        assert_eq!(FailureKind::WorkerCrashed.family(), FailureFamily::Infrastructure);
    }

    #[test]
    fn test_every_kind_has_user_text() {
        for kind in FailureKind::ALL {
            assert!(!kind.user_message().is_empty());
            assert!(!kind.suggestion().is_empty());
        }
    }

    #[test]
    fn test_timeouts_wait_longer_than_worker_retries() {
        assert!(
            FailureKind::NetworkTimeout.backoff_multiplier()
                > FailureKind::WorkerCrashed.backoff_multiplier()
        );
    }
}
