//! Re-issue an expired access URL

use std::sync::Arc;

use async_trait::async_trait;
use docrecover_common::error::FailureKind;
use serde_json::json;
use tracing::{debug, warn};

use super::{RecoveryStrategy, UrlRefresher};
use crate::context::{RecoveryContext, RecoveryResult};
use crate::error::RecoveryError;

pub const NAME: &str = "url-refresh";
pub const PRIORITY: u32 = 80;
pub const MAX_ATTEMPTS: u32 = 2;

pub struct UrlRefreshStrategy {
    refresher: Arc<dyn UrlRefresher>,
}

impl UrlRefreshStrategy {
    pub fn new(refresher: Arc<dyn UrlRefresher>) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl RecoveryStrategy for UrlRefreshStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u32 {
        PRIORITY
    }

    fn max_attempts(&self) -> u32 {
        MAX_ATTEMPTS
    }

    fn can_handle(&self, error: &RecoveryError) -> bool {
        error.kind() == FailureKind::UrlExpired
    }

    async fn attempt(&self, _error: &RecoveryError, context: &RecoveryContext) -> RecoveryResult {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.refresher.refresh(context).await {
                Ok(url) => {
                    debug!(operation_id = %context.operation_id, attempt, "Access URL refreshed");
                    return RecoveryResult::succeeded(NAME, Some(json!({ "url": url })));
                }
                Err(fault) => {
                    warn!(operation_id = %context.operation_id, attempt, %fault, "URL refresh failed");
                }
            }
        }

        RecoveryResult::try_next(NAME, FailureKind::UrlExpired.user_message())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use docrecover_common::error::{ClassifiedError, Fault};

    use super::*;

    struct FlakyRefresher {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl UrlRefresher for FlakyRefresher {
        async fn refresh(&self, context: &RecoveryContext) -> Result<String, Fault> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(Fault::new("signing service unavailable"));
            }
            Ok(format!("https://files.example/{}?sig=new", context.document_id().unwrap_or("doc")))
        }
    }

    fn expired() -> RecoveryError {
        RecoveryError::Failed(ClassifiedError::new(FailureKind::UrlExpired, "403 expired"))
    }

    #[tokio::test]
    async fn test_refresh_returns_new_url() {
        let refresher = Arc::new(FlakyRefresher { failures: 1, calls: AtomicU32::new(0) });
        let strategy = UrlRefreshStrategy::new(refresher.clone());
        let context = RecoveryContext::new("fetch-document").with_metadata("document_id", "doc-7");

        let result = strategy.attempt(&expired(), &context).await;

        assert!(result.success);
        assert_eq!(result.data, Some(json!({ "url": "https://files.example/doc-7?sig=new" })));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_tries() {
        let refresher = Arc::new(FlakyRefresher { failures: 10, calls: AtomicU32::new(0) });
        let strategy = UrlRefreshStrategy::new(refresher.clone());

        let result = strategy.attempt(&expired(), &RecoveryContext::new("fetch-document")).await;

        assert!(!result.success);
        assert!(result.should_retry);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[test]
    fn test_only_handles_expired_urls() {
        let refresher = Arc::new(FlakyRefresher { failures: 0, calls: AtomicU32::new(0) });
        let strategy = UrlRefreshStrategy::new(refresher);
        let other = RecoveryError::Failed(ClassifiedError::new(FailureKind::CacheMiss, "miss"));

        assert!(strategy.can_handle(&expired()));
        assert!(!strategy.can_handle(&other));
    }
}
