//! Deterministic mapping from raw faults to [`ClassifiedError`]
//!
//! Structured information (a pre-tagged kind, a well-known error name, a
//! status code) always wins. Keyword matching on the message is only the
//! fallback for opaque faults, and it is approximate by nature: the rule
//! order below is fixed so that the same text always yields the same kind.
//!
//! | order | marker | kind |
//! |-------|--------|------|
//! | 1 | `timeout`, `timed out` | network-timeout |
//! | 2 | `cors`, `permission`, `forbidden`, `access denied`, `not allowed` | permission-denied |
//! | 3 | `out of memory`, `exhausted`, `allocation` + `fail` | memory-exhausted |
//! | 4 | `worker` | worker-init-failed |
//! | 5 | `corrupt`, `damaged` | document-corrupted |
//! | 6 | `invalid` + `pdf`, `unsupported format` | conversion-failed (invalid format) |
//! | 7 | `network`, `failed to fetch` | network-failure |
//! | 8 | `password`, `encrypt` | permission-denied (password) |
//! | 9 | `canvas`, `render` | conversion-failed (render) |
//! | 10 | anything else | unknown |

use std::collections::HashMap;

use chrono::Utc;

use super::{ClassifiedError, FailureKind, FailureVariant, Fault};

/// Stateless fault classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// The classifier holds no state; every instance behaves the same
    pub fn new() -> Self {
        Self
    }

    /// Classify a fault, merging the optional caller context into the result
    ///
    /// Never fails: empty or unusual faults classify as
    /// [`FailureKind::Unknown`].
    pub fn classify(
        &self,
        fault: &Fault,
        context: Option<&HashMap<String, String>>,
    ) -> ClassifiedError {
        let (kind, variant) = self.kind_of(fault);

        let mut merged = fault.context.clone();
        if let Some(extra) = context {
            for (key, value) in extra {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        if let Some(status) = fault.status {
            merged.entry("status".to_string()).or_insert_with(|| status.to_string());
        }
        if let Some(name) = &fault.name {
            merged.entry("name".to_string()).or_insert_with(|| name.clone());
        }

        let message = if fault.message.trim().is_empty() {
            kind.user_message().to_string()
        } else {
            fault.message.clone()
        };

        ClassifiedError {
            kind,
            variant: fault.variant.or(variant),
            message,
            original_cause: fault.source.clone(),
            timestamp: Utc::now(),
            context: merged,
        }
    }

    /// Kind and optional variant for a fault, without building the error
    pub fn kind_of(&self, fault: &Fault) -> (FailureKind, Option<FailureVariant>) {
        if let Some(kind) = fault.kind {
            return (kind, fault.variant);
        }
        if let Some(found) = fault.name.as_deref().and_then(Self::from_name) {
            return found;
        }
        if let Some(found) = fault.status.and_then(Self::from_status) {
            return found;
        }
        Self::from_message(&fault.message)
    }

    fn from_name(name: &str) -> Option<(FailureKind, Option<FailureVariant>)> {
        match name {
            "TimeoutError" | "AbortError" => Some((FailureKind::NetworkTimeout, None)),
            "SecurityError" => Some((FailureKind::PermissionDenied, Some(FailureVariant::Cors))),
            "QuotaExceededError" => Some((FailureKind::MemoryExhausted, None)),
            "PasswordException" => {
                Some((FailureKind::PermissionDenied, Some(FailureVariant::Password)))
            }
            "InvalidPDFException" => {
                Some((FailureKind::ConversionFailed, Some(FailureVariant::InvalidFormat)))
            }
            _ => None,
        }
    }

    fn from_status(status: u16) -> Option<(FailureKind, Option<FailureVariant>)> {
        let kind = match status {
            401 | 403 => FailureKind::PermissionDenied,
            404 => FailureKind::PagesNotFound,
            408 | 504 => FailureKind::NetworkTimeout,
            410 => FailureKind::UrlExpired,
            502 | 503 => FailureKind::NetworkUnavailable,
            500..=599 => FailureKind::NetworkFailure,
            _ => return None,
        };
        Some((kind, None))
    }

    fn from_message(message: &str) -> (FailureKind, Option<FailureVariant>) {
        let text = message.to_lowercase();
        let has = |needle: &str| text.contains(needle);

        if has("timeout") || has("timed out") {
            return (FailureKind::NetworkTimeout, None);
        }
        if has("cors") {
            return (FailureKind::PermissionDenied, Some(FailureVariant::Cors));
        }
        if has("permission") || has("forbidden") || has("access denied") || has("not allowed") {
            return (FailureKind::PermissionDenied, None);
        }
        if has("out of memory") || has("exhausted") {
            return (FailureKind::MemoryExhausted, None);
        }
        if has("allocation") && has("fail") {
            return (FailureKind::MemoryExhausted, Some(FailureVariant::Allocation));
        }
        if has("worker") {
            return (FailureKind::WorkerInitFailed, None);
        }
        if has("corrupt") || has("damaged") {
            return (FailureKind::DocumentCorrupted, None);
        }
        if (has("invalid") && has("pdf")) || has("unsupported format") {
            return (FailureKind::ConversionFailed, Some(FailureVariant::InvalidFormat));
        }
        if has("network") || has("failed to fetch") {
            return (FailureKind::NetworkFailure, None);
        }
        if has("password") || has("encrypt") {
            return (FailureKind::PermissionDenied, Some(FailureVariant::Password));
        }
        if has("canvas") || has("render") {
            return (FailureKind::ConversionFailed, Some(FailureVariant::Render));
        }
        (FailureKind::Unknown, None)
    }
}
