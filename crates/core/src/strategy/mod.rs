//! Recovery strategies tried after the retry executor gives up
//!
//! Strategies are trait objects kept in descending priority order. For a
//! failed call the chain runs the first strategy that can handle the error:
//!
//! - `success` ends the walk with that result
//! - `!success && should_retry` moves on to the next matching strategy
//! - `!success && !should_retry` ends the walk as a failure
//!
//! Each strategy bounds its own internal tries (1 to 3) independently of the
//! executor's budget.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::context::{RecoveryContext, RecoveryResult};
use crate::error::RecoveryError;

pub mod cache;
pub mod network;
pub mod ports;
pub mod url_refresh;

pub use cache::CacheRebuildStrategy;
pub use network::NetworkRetryStrategy;
pub use ports::{
    CacheInvalidator, ConnectivityProbe, ConversionTrigger, DocumentFetcher, FetchProbe,
    UrlRefresher,
};
pub use url_refresh::UrlRefreshStrategy;

/// A named, bounded remediation for one family of failures
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first
    fn priority(&self) -> u32;

    /// Internal tries per invocation
    fn max_attempts(&self) -> u32;

    fn can_handle(&self, error: &RecoveryError) -> bool;

    /// Try to repair the cause of `error`; must be safe to call once per
    /// failure
    async fn attempt(&self, error: &RecoveryError, context: &RecoveryContext) -> RecoveryResult;
}

/// Priority-ordered list of strategies
#[derive(Default)]
pub struct RecoveryStrategyChain {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
}

impl RecoveryStrategyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.register(strategy);
        self
    }

    /// Insert keeping descending priority; equal priorities keep insertion
    /// order
    pub fn register(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        let position = self
            .strategies
            .iter()
            .position(|existing| existing.priority() < strategy.priority())
            .unwrap_or(self.strategies.len());
        self.strategies.insert(position, strategy);
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    #[instrument(
        skip_all,
        fields(operation_class = %context.operation_class, kind = %error.kind())
    )]
    pub async fn recover(&self, error: &RecoveryError, context: &RecoveryContext) -> RecoveryResult {
        for strategy in self.strategies.iter().filter(|s| s.can_handle(error)) {
            debug!(strategy = strategy.name(), "Attempting recovery strategy");
            let result = strategy.attempt(error, context).await;

            if result.success {
                info!(strategy = strategy.name(), "Recovery strategy succeeded");
                return result;
            }
            if !result.should_retry {
                debug!(strategy = strategy.name(), "Recovery strategy failed, stopping chain");
                break;
            }
            debug!(strategy = strategy.name(), "Recovery strategy failed, trying next");
        }

        RecoveryResult::no_strategy()
    }
}
