//! Classified error: a fault after it has been given a [`FailureKind`]

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::fault::SharedCause;
use super::{ErrorClassification, ErrorSeverity, FailureKind, FailureVariant};

/// An immutable, typed failure
///
/// The `kind` is decided once by the classifier and never changes for the
/// rest of the call chain. `original_cause` keeps the technical detail for
/// diagnostics; `user_message()` and `suggestion()` never depend on it.
#[derive(Clone, Serialize)]
pub struct ClassifiedError {
    pub(crate) kind: FailureKind,
    pub(crate) variant: Option<FailureVariant>,
    pub(crate) message: String,
    #[serde(serialize_with = "serialize_cause")]
    pub(crate) original_cause: Option<SharedCause>,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) context: HashMap<String, String>,
}

fn serialize_cause<S>(cause: &Option<SharedCause>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match cause {
        Some(cause) => serializer.serialize_some(&cause.to_string()),
        None => serializer.serialize_none(),
    }
}

impl ClassifiedError {
    /// Build a classified error directly, bypassing text classification
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            variant: None,
            message: message.into(),
            original_cause: None,
            timestamp: Utc::now(),
            context: HashMap::new(),
        }
    }

    /// The failure kind, fixed at classification
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Finer-grained cause within the kind, when known
    pub fn variant(&self) -> Option<FailureVariant> {
        self.variant
    }

    /// Technical message, for logs rather than users
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The error the fault was built from, if any
    pub fn original_cause(&self) -> Option<&SharedCause> {
        self.original_cause.as_ref()
    }

    /// When the error was classified
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Metadata merged from the fault and the call context
    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    /// Attach a variant while the error is still being built
    pub fn with_variant(mut self, variant: FailureVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Keep the technical cause for diagnostics
    pub fn with_cause(mut self, cause: SharedCause) -> Self {
        self.original_cause = Some(cause);
        self
    }

    /// Add one metadata entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Plain-language message suitable for direct display
    pub fn user_message(&self) -> &'static str {
        match (self.kind, self.variant) {
            (FailureKind::PermissionDenied, Some(FailureVariant::Password)) => {
                "This document is password protected."
            }
            (FailureKind::ConversionFailed, Some(FailureVariant::InvalidFormat)) => {
                "This file format is not supported for viewing."
            }
            (FailureKind::NetworkUnavailable, Some(FailureVariant::CircuitOpen)) => {
                "The document service is temporarily paused after repeated errors."
            }
            (kind, _) => kind.user_message(),
        }
    }

    /// Actionable next step for the user
    pub fn suggestion(&self) -> &'static str {
        match (self.kind, self.variant) {
            (FailureKind::PermissionDenied, Some(FailureVariant::Password)) => {
                "Remove the password protection and upload the file again."
            }
            (FailureKind::ConversionFailed, Some(FailureVariant::InvalidFormat)) => {
                "Download the file and open it with a compatible application."
            }
            (kind, _) => kind.suggestion(),
        }
    }

    /// One metadata entry, by key
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

impl ErrorClassification for ClassifiedError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    fn severity(&self) -> ErrorSeverity {
        self.kind.severity()
    }
}

impl fmt::Debug for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifiedError")
            .field("kind", &self.kind)
            .field("variant", &self.variant)
            .field("message", &self.message)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Some(variant) => write!(f, "[{}/{}] {}", self.kind, variant, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.original_cause.as_deref().map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
