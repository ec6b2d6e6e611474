//! Shared foundations for the document recovery engine.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: failure taxonomy, classification, serde helpers
//! - `observability`: adds `tracing` instrumentation
//! - `runtime`: clock, backoff and circuit breaker (implies both above)
//! - `test-utils`: scripted operations and assertions for tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
#[macro_use]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "runtime", feature = "test-utils"))]
pub mod testing;

// Note: engine configuration and the retry loop live in docrecover-core.

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{
    ClassifiedError, ErrorClassification, ErrorClassifier, ErrorSeverity, FailureFamily,
    FailureKind, FailureVariant, Fault, SharedCause,
};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffPolicy, BreakerOpen, CallPermit, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerMetrics, CircuitSnapshot, CircuitState, Clock,
    ConfigError, ConfigResult, MockClock, ResilienceError, ResilienceResult, RetryPolicy,
    RetryPolicyBuilder, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
