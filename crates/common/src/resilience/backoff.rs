//! Exponential backoff with kind-aware scaling and additive jitter
//!
//! ```text
//! base    = base_delay * kind.backoff_multiplier() * backoff_multiplier^(attempt - 1)
//! capped  = min(base, max_delay)
//! delay   = capped + uniform(0, 0.3 * capped)   (jitter enabled)
//! ```
//!
//! Jitter is strictly additive so it never pulls a delay below `capped`.

use std::time::Duration;

use rand::Rng;

use super::policy::{RetryPolicy, JITTER_FACTOR, MAX_BACKOFF_EXPONENT};
use crate::error::FailureKind;

/// Pure delay calculator for one retry policy
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    policy: RetryPolicy,
}

impl BackoffPolicy {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay(&self, kind: FailureKind, attempt: u32) -> Duration {
        let capped = self.capped_delay(kind, attempt);
        if self.policy.jitter_enabled {
            capped + Self::jitter(capped)
        } else {
            capped
        }
    }

    /// Delay before jitter is applied; monotonic in `attempt`
    pub fn capped_delay(&self, kind: FailureKind, attempt: u32) -> Duration {
        let exponent = attempt.max(1).saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let base_ms = self.policy.base_delay.as_millis() as f64
            * kind.backoff_multiplier()
            * self.policy.backoff_multiplier.powi(exponent as i32);
        let max_ms = self.policy.max_delay.as_millis() as f64;

        Duration::from_millis(base_ms.min(max_ms).max(0.0) as u64)
    }

    /// Largest delay `delay()` can ever return
    pub fn max_delay_with_jitter(&self) -> Duration {
        self.policy.max_delay.mul_f64(1.0 + JITTER_FACTOR)
    }

    fn jitter(capped: Duration) -> Duration {
        let ceiling = capped.as_millis() as f64 * JITTER_FACTOR;
        if ceiling < 1.0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0.0..=ceiling) as u64)
    }
}
