//! Integration tests for the resilience primitives
//!
//! Breaker timing runs on a `MockClock`; backoff is checked against the
//! documented formula.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docrecover_common::error::FailureKind;
use docrecover_common::resilience::{
    BackoffPolicy, CircuitBreaker, CircuitBreakerConfig, CircuitState, MockClock,
    ResilienceError, RetryPolicy,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mock_breaker(
    failure_threshold: u64,
    success_threshold: u64,
    timeout: Duration,
) -> (CircuitBreaker<MockClock>, MockClock) {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(failure_threshold)
        .success_threshold(success_threshold)
        .timeout(timeout)
        .build()
        .expect("Failed to build config");
    let breaker = CircuitBreaker::with_clock("convert", config, Arc::new(clock.clone()))
        .expect("Failed to create circuit breaker");
    (breaker, clock)
}

/// Validates the full breaker cycle.
///
/// # Test Steps
/// 1. Fail until the threshold opens the circuit
/// 2. Verify calls are rejected without invoking the operation
/// 3. Advance past the timeout and verify a trial call is admitted
/// 4. Succeed `success_threshold` times and verify the circuit closes
#[tokio::test]
async fn test_circuit_breaker_full_cycle() {
    init_tracing();
    let (breaker, clock) = mock_breaker(3, 2, Duration::from_secs(60));
    let invocations = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let counter = Arc::clone(&invocations);
        let result = breaker
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("service down")
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::OperationFailed(_))));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let counter = Arc::clone(&invocations);
    let rejected = breaker
        .execute(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;
    match rejected {
        Err(ResilienceError::CircuitOpen { retry_after }) => {
            assert_eq!(retry_after, Duration::from_secs(60));
        }
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 3, "open breaker must not invoke");

    clock.advance(Duration::from_secs(60));
    for _ in 0..2 {
        let result = breaker.execute(|| async { Ok::<_, &str>("page") }).await;
        assert_eq!(result.expect("trial succeeds"), "page");
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn test_breakers_for_different_classes_are_independent() -> anyhow::Result<()> {
    let (convert, _clock) = mock_breaker(1, 1, Duration::from_secs(10));
    let (fetch, _clock) = mock_breaker(1, 1, Duration::from_secs(10));

    convert.record_failure();
    assert_eq!(convert.state(), CircuitState::Open);
    assert_eq!(fetch.state(), CircuitState::Closed);
    let _permit = fetch.try_acquire()?;
    Ok(())
}

/// Delay for the documented scenario: base 1000ms, multiplier 2, no jitter,
/// kind multiplier 1.5 for timeouts.
#[test]
fn test_backoff_scenario_for_timeouts() {
    let policy = RetryPolicy::builder()
        .max_attempts(3)
        .base_delay(Duration::from_millis(1000))
        .backoff_multiplier(2.0)
        .jitter(false)
        .build()
        .expect("valid policy");
    let backoff = BackoffPolicy::new(policy);

    assert_eq!(backoff.delay(FailureKind::NetworkTimeout, 1), Duration::from_millis(1500));
    assert_eq!(backoff.delay(FailureKind::NetworkTimeout, 2), Duration::from_millis(3000));
}

#[test]
fn test_backoff_with_jitter_never_exceeds_ceiling() {
    let backoff = BackoffPolicy::new(RetryPolicy::default());
    let ceiling = backoff.max_delay_with_jitter();

    for kind in FailureKind::ALL {
        for attempt in 1..=20 {
            assert!(backoff.delay(kind, attempt) <= ceiling, "{kind} attempt {attempt}");
        }
    }
}
