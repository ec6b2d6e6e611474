//! Resilience primitives for document operations
//!
//! - **Circuit Breaker**: fails fast while an operation class keeps failing
//! - **Backoff**: exponential, kind-aware delays with additive jitter
//! - **Clock**: injectable time source so breaker timing is testable
//!
//! These are the building blocks; the retry loop, recovery strategies and
//! degradation live in `docrecover-core`.

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod policy;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{
    BreakerOpen, CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitSnapshot, CircuitState, ResilienceError, ResilienceResult,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use policy::{
    ConfigError, ConfigResult, RetryPolicy, RetryPolicyBuilder, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, JITTER_FACTOR,
};
