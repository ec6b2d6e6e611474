//! Custom assertions for testing

// Assertions are designed to panic on failure
#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

/// Assert that a result failed with the given [`FailureKind`]
///
/// Works with any error type exposing a `kind()` accessor, such as
/// `ClassifiedError`.
///
/// [`FailureKind`]: crate::error::FailureKind
///
/// ```
/// use docrecover_common::error::{ClassifiedError, FailureKind};
///
/// let result: Result<(), ClassifiedError> =
///     Err(ClassifiedError::new(FailureKind::UrlExpired, "gone"));
/// docrecover_common::assert_failure_kind!(result, FailureKind::UrlExpired);
/// ```
#[macro_export]
macro_rules! assert_failure_kind {
    ($result:expr, $kind:expr) => {
        match &$result {
            Ok(_) => panic!("Expected failure of kind {:?} but got Ok", $kind),
            Err(e) => assert_eq!(e.kind(), $kind, "Unexpected failure kind for {:?}", e),
        }
    };
}

/// Assert that an error's Display output contains a substring
#[macro_export]
macro_rules! assert_error_contains {
    ($result:expr, $substring:expr) => {
        match &$result {
            Ok(_) => panic!("Expected error but got Ok"),
            Err(e) => {
                let error_msg = format!("{}", e);
                assert!(
                    error_msg.contains($substring),
                    "Error message '{}' does not contain '{}'",
                    error_msg,
                    $substring
                );
            }
        }
    };
}

/// Assert that a duration is within tolerance of an expected value
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let min = expected.saturating_sub(tolerance);
    let max = expected + tolerance;

    assert!(
        actual >= min && actual <= max,
        "Duration {:?} not in range [{:?}, {:?}]",
        actual,
        min,
        max
    );
}

/// Assert a sequence of observed delays, in milliseconds, with a tolerance
///
/// Paused-clock tests record exact delays; real-time tests need slack.
pub fn assert_delays(actual: &[Duration], expected_ms: &[u64], tolerance: Duration) {
    assert_eq!(
        actual.len(),
        expected_ms.len(),
        "Expected {} delays, observed {:?}",
        expected_ms.len(),
        actual
    );
    for (observed, expected) in actual.iter().zip(expected_ms) {
        assert_duration_in_range(*observed, Duration::from_millis(*expected), tolerance);
    }
}
