//! Per-call recovery context and recovery results

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use docrecover_common::error::ClassifiedError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known metadata keys read by the built-in strategies
pub mod metadata_keys {
    /// Identifier of the document the operation works on
    pub const DOCUMENT_ID: &str = "document_id";
    /// Access URL the operation fetches from
    pub const URL: &str = "url";
}

/// State threaded through one top-level call
///
/// Owned by that call only; concurrent calls never share a context.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryContext {
    pub operation_id: Uuid,
    pub operation_class: String,
    pub attempt_number: u32,
    pub previous_errors: Vec<ClassifiedError>,
    pub metadata: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
}

impl RecoveryContext {
    pub fn new(operation_class: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            operation_class: operation_class.into(),
            attempt_number: 1,
            previous_errors: Vec::new(),
            metadata: HashMap::new(),
            started_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn document_id(&self) -> Option<&str> {
        self.metadata_value(metadata_keys::DOCUMENT_ID)
    }

    pub fn last_error(&self) -> Option<&ClassifiedError> {
        self.previous_errors.last()
    }
}

/// Outcome of a recovery strategy or of degradation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub should_retry: bool,
    pub strategy_used: String,
    pub degraded: bool,
    pub user_message: Option<String>,
}

impl RecoveryResult {
    /// Message reported when the chain could not recover the call
    pub const NO_STRATEGY_MESSAGE: &'static str = "no suitable recovery strategy found";

    pub fn succeeded(strategy: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            data,
            should_retry: false,
            strategy_used: strategy.into(),
            degraded: false,
            user_message: None,
        }
    }

    /// Failure after which no further strategy should run
    pub fn failed(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            should_retry: false,
            strategy_used: strategy.into(),
            degraded: false,
            user_message: Some(message.into()),
        }
    }

    /// Failure that lets the chain move on to the next matching strategy
    pub fn try_next(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self { should_retry: true, ..Self::failed(strategy, message) }
    }

    pub fn degraded(
        strategy: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            should_retry: false,
            strategy_used: strategy.into(),
            degraded: true,
            user_message: Some(message.into()),
        }
    }

    pub fn no_strategy() -> Self {
        Self::failed("none", Self::NO_STRATEGY_MESSAGE)
    }
}

/// What `RecoveryEngine::execute` hands back when the caller gets something
/// usable
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome<T> {
    /// The operation succeeded within its retry budget
    Completed(T),
    /// A recovery strategy repaired the failure and the operation then
    /// succeeded
    Recovered { value: T, strategy: String },
    /// Full recovery failed; a reduced-capability result is offered instead
    Degraded(RecoveryResult),
}

impl<T> RecoveryOutcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Completed(value) | Self::Recovered { value, .. } => Some(value),
            Self::Degraded(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed(value) | Self::Recovered { value, .. } => Some(value),
            Self::Degraded(_) => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// Strategy or degradation tag involved, if any
    pub fn strategy(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::Recovered { strategy, .. } => Some(strategy),
            Self::Degraded(result) => Some(&result.strategy_used),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_unique_per_call() {
        let a = RecoveryContext::new("convert");
        let b = RecoveryContext::new("convert");
        assert_ne!(a.operation_id, b.operation_id);
        assert_eq!(a.attempt_number, 1);
        assert!(a.previous_errors.is_empty());
    }

    #[test]
    fn test_metadata_helpers() {
        let context = RecoveryContext::new("fetch-pages")
            .with_metadata(metadata_keys::DOCUMENT_ID, "doc-42")
            .with_metadata(metadata_keys::URL, "https://files.example/doc-42");
        assert_eq!(context.document_id(), Some("doc-42"));
        assert_eq!(context.metadata_value("missing"), None);
    }

    #[test]
    fn test_result_constructors() {
        let next = RecoveryResult::try_next("network-retry", "still offline");
        assert!(!next.success && next.should_retry && !next.degraded);

        let none = RecoveryResult::no_strategy();
        assert!(!none.success && !none.should_retry);
        assert_eq!(none.user_message.as_deref(), Some("no suitable recovery strategy found"));

        let degraded = RecoveryResult::degraded("static-view", "msg", serde_json::json!({}));
        assert!(degraded.success && degraded.degraded);
    }

    #[test]
    fn test_outcome_accessors() {
        let completed = RecoveryOutcome::Completed(3);
        assert_eq!(completed.value(), Some(&3));
        assert_eq!(completed.strategy(), None);

        let recovered = RecoveryOutcome::Recovered { value: 4, strategy: "url-refresh".into() };
        assert_eq!(recovered.strategy(), Some("url-refresh"));
        assert_eq!(recovered.into_value(), Some(4));

        let degraded: RecoveryOutcome<u8> =
            RecoveryOutcome::Degraded(RecoveryResult::no_strategy());
        assert!(degraded.is_degraded());
        assert_eq!(degraded.into_value(), None);
    }
}
