//! Wait for connectivity to come back, then ask for one more attempt

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docrecover_common::error::{FailureFamily, FailureKind};
use docrecover_common::resilience::{BackoffPolicy, ConfigResult, RetryPolicy};
use tracing::debug;

use super::{ConnectivityProbe, RecoveryStrategy};
use crate::context::{RecoveryContext, RecoveryResult};
use crate::error::RecoveryError;

pub const NAME: &str = "network-retry";
pub const PRIORITY: u32 = 100;
pub const MAX_ATTEMPTS: u32 = 3;

/// Probes connectivity with backoff between tries
///
/// Breaker rejections are left to degradation: the breaker already decided
/// when the class may be tried again.
pub struct NetworkRetryStrategy {
    probe: Arc<dyn ConnectivityProbe>,
    backoff: BackoffPolicy,
}

impl NetworkRetryStrategy {
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        let policy = RetryPolicy {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_enabled: false,
        };
        Self { probe, backoff: BackoffPolicy::new(policy) }
    }

    /// Use a custom probe delay schedule
    pub fn with_policy(probe: Arc<dyn ConnectivityProbe>, policy: RetryPolicy) -> ConfigResult<Self> {
        policy.validate()?;
        Ok(Self { probe, backoff: BackoffPolicy::new(policy) })
    }
}

#[async_trait]
impl RecoveryStrategy for NetworkRetryStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u32 {
        PRIORITY
    }

    fn max_attempts(&self) -> u32 {
        self.backoff.policy().max_attempts
    }

    fn can_handle(&self, error: &RecoveryError) -> bool {
        !error.is_circuit_open() && error.kind().family() == FailureFamily::Network
    }

    async fn attempt(&self, _error: &RecoveryError, context: &RecoveryContext) -> RecoveryResult {
        let tries = self.max_attempts();
        for attempt in 1..=tries {
            if self.probe.is_reachable().await {
                debug!(operation_id = %context.operation_id, attempt, "Connectivity restored");
                return RecoveryResult::succeeded(NAME, None);
            }
            if attempt < tries {
                // Probe delays use the network-failure scale regardless of the original kind
                tokio::time::sleep(self.backoff.delay(FailureKind::NetworkFailure, attempt)).await;
            }
        }

        RecoveryResult::try_next(NAME, FailureKind::NetworkUnavailable.user_message())
    }
}
