//! Integration tests for failure classification
//!
//! Exercises the classifier through the public API the engine uses: faults
//! produced by std and serde errors, structured hints and plain text.

#![cfg(feature = "foundation")]

use std::collections::HashMap;
use std::io;

use docrecover_common::error::{
    ClassifiedError, ErrorClassification, ErrorClassifier, ErrorSeverity, FailureKind,
    FailureVariant, Fault,
};

/// Every kind's attribute table entry is internally consistent.
///
/// Non-retryable kinds never get more than one attempt, and a kind that is
/// retryable is always recoverable.
#[test]
fn test_kind_attributes_are_consistent() {
    for kind in FailureKind::ALL {
        if !kind.is_retryable() {
            assert_eq!(kind.max_attempts(), 1, "{kind}");
        }
        if kind.is_retryable() {
            assert!(kind.is_recoverable(), "{kind}");
        }
        assert!(!kind.user_message().is_empty(), "{kind}");
        assert!(!kind.suggestion().is_empty(), "{kind}");
        assert!(kind.backoff_multiplier() > 0.0, "{kind}");
    }
}

#[test]
fn test_io_errors_carry_kind_hints() {
    let classifier = ErrorClassifier::new();

    let timed_out = Fault::from(io::Error::new(io::ErrorKind::TimedOut, "deadline"));
    assert_eq!(classifier.classify(&timed_out, None).kind(), FailureKind::NetworkTimeout);

    let refused = Fault::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
    assert_eq!(classifier.classify(&refused, None).kind(), FailureKind::NetworkFailure);

    let denied = Fault::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
    let error = classifier.classify(&denied, None);
    assert_eq!(error.kind(), FailureKind::PermissionDenied);
    assert!(!error.is_recoverable());
}

#[test]
fn test_original_cause_is_preserved_for_diagnostics() {
    let classifier = ErrorClassifier::new();
    let fault = Fault::from(io::Error::new(io::ErrorKind::InvalidData, "bad xref table"));

    let error = classifier.classify(&fault, None);
    assert_eq!(error.kind(), FailureKind::DocumentCorrupted);
    assert_eq!(error.severity(), ErrorSeverity::Critical);

    let source = std::error::Error::source(&error).expect("cause kept");
    assert_eq!(source.to_string(), "bad xref table");
}

#[test]
fn test_serde_json_errors_classify_from_text() {
    let classifier = ErrorClassifier::new();
    let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();

    let error = classifier.classify(&Fault::from(parse_error), None);
    assert_eq!(error.context_value("name"), Some("SerializationError"));
}

#[test]
fn test_status_codes_win_over_message_text() {
    let classifier = ErrorClassifier::new();
    let fault = Fault::new("network error while fetching").with_status(410);

    let error = classifier.classify(&fault, None);
    assert_eq!(error.kind(), FailureKind::UrlExpired);
    assert_eq!(error.context_value("status"), Some("410"));
}

#[test]
fn test_caller_context_is_merged_without_overwriting() {
    let classifier = ErrorClassifier::new();
    let fault = Fault::new("render failed").with_context("page", "3");

    let mut extra = HashMap::new();
    extra.insert("page".to_string(), "99".to_string());
    extra.insert("document_id".to_string(), "doc-1".to_string());

    let error = classifier.classify(&fault, Some(&extra));
    assert_eq!(error.kind(), FailureKind::ConversionFailed);
    assert_eq!(error.variant(), Some(FailureVariant::Render));
    assert_eq!(error.context_value("page"), Some("3"));
    assert_eq!(error.context_value("document_id"), Some("doc-1"));
}

/// A classified error turned back into a fault keeps its kind, even when its
/// message would classify differently.
#[test]
fn test_reclassification_is_stable() {
    let classifier = ErrorClassifier::new();
    let original = ClassifiedError::new(FailureKind::CacheMiss, "request timed out");

    let again = classifier.classify(&Fault::from(original), None);
    assert_eq!(again.kind(), FailureKind::CacheMiss);
}

#[test]
fn test_classified_error_serializes_with_text_cause() {
    let classifier = ErrorClassifier::new();
    let fault = Fault::from(io::Error::new(io::ErrorKind::TimedOut, "socket stalled"));

    let json = serde_json::to_value(classifier.classify(&fault, None)).unwrap();
    assert_eq!(json["kind"], "network-timeout");
    assert_eq!(json["original_cause"], "socket stalled");
}
