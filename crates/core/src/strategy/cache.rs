//! Drop stale cached pages and optionally regenerate them

use std::sync::Arc;

use async_trait::async_trait;
use docrecover_common::error::FailureKind;
use tracing::{debug, warn};

use super::{CacheInvalidator, ConversionTrigger, RecoveryStrategy};
use crate::context::{RecoveryContext, RecoveryResult};
use crate::error::RecoveryError;

pub const NAME: &str = "cache-rebuild";
pub const PRIORITY: u32 = 60;
pub const MAX_ATTEMPTS: u32 = 1;

pub struct CacheRebuildStrategy {
    invalidator: Arc<dyn CacheInvalidator>,
    trigger: Option<Arc<dyn ConversionTrigger>>,
}

impl CacheRebuildStrategy {
    pub fn new(invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self { invalidator, trigger: None }
    }

    /// Also restart conversion after invalidating
    pub fn with_trigger(mut self, trigger: Arc<dyn ConversionTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }
}

#[async_trait]
impl RecoveryStrategy for CacheRebuildStrategy {
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
        matches!(error.kind(), FailureKind::CacheMiss | FailureKind::PagesNotFound)
    }

    async fn attempt(&self, _error: &RecoveryError, context: &RecoveryContext) -> RecoveryResult {
        let Some(document_id) = context.document_id() else {
            return RecoveryResult::failed(NAME, "document id missing, cannot rebuild cache");
        };

        if let Err(fault) = self.invalidator.invalidate(document_id).await {
            warn!(document_id, %fault, "Cache invalidation failed");
            return RecoveryResult::try_next(NAME, FailureKind::CacheMiss.user_message());
        }

        if let Some(trigger) = &self.trigger {
            if let Err(fault) = trigger.trigger(document_id).await {
                warn!(document_id, %fault, "Conversion trigger failed");
                return RecoveryResult::try_next(NAME, FailureKind::PagesNotFound.user_message());
            }
        }

        debug!(document_id, "Cache rebuilt");
        RecoveryResult::succeeded(NAME, None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use docrecover_common::error::{ClassifiedError, Fault};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_trigger: bool,
    }

    #[async_trait]
    impl CacheInvalidator for Recorder {
        async fn invalidate(&self, document_id: &str) -> Result<(), Fault> {
            self.calls.lock().unwrap().push(format!("invalidate:{document_id}"));
            Ok(())
        }
    }

    #[async_trait]
    impl ConversionTrigger for Recorder {
        async fn trigger(&self, document_id: &str) -> Result<(), Fault> {
            self.calls.lock().unwrap().push(format!("trigger:{document_id}"));
            if self.fail_trigger {
                return Err(Fault::new("queue full"));
            }
            Ok(())
        }
    }

    fn missing_pages() -> RecoveryError {
        RecoveryError::Failed(ClassifiedError::new(FailureKind::PagesNotFound, "404 pages"))
    }

    #[tokio::test]
    async fn test_invalidates_then_triggers() {
        let recorder = Arc::new(Recorder::default());
        let strategy = CacheRebuildStrategy::new(recorder.clone()).with_trigger(recorder.clone());
        let context = RecoveryContext::new("fetch-pages").with_metadata("document_id", "doc-1");

        let result = strategy.attempt(&missing_pages(), &context).await;

        assert!(result.success);
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["invalidate:doc-1", "trigger:doc-1"]);
    }

    #[tokio::test]
    async fn test_requires_document_id() {
        let recorder = Arc::new(Recorder::default());
        let strategy = CacheRebuildStrategy::new(recorder.clone());

        let result = strategy.attempt(&missing_pages(), &RecoveryContext::new("fetch-pages")).await;

        assert!(!result.success);
        assert!(!result.should_retry);
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_failure_lets_chain_continue() {
        let recorder = Arc::new(Recorder { fail_trigger: true, ..Default::default() });
        let strategy = CacheRebuildStrategy::new(recorder.clone()).with_trigger(recorder.clone());
        let context = RecoveryContext::new("fetch-pages").with_metadata("document_id", "doc-1");

        let result = strategy.attempt(&missing_pages(), &context).await;

        assert!(!result.success);
        assert!(result.should_retry);
    }
}
