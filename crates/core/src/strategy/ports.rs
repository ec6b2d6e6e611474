//! Port interfaces for recovery collaborators
//!
//! The surrounding application supplies these; strategies never touch
//! platform resources directly.

use std::sync::Arc;

use async_trait::async_trait;
use docrecover_common::error::Fault;

use crate::context::RecoveryContext;

/// Fetches document bytes from a URL
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, Fault>;
}

/// Re-issues a time-limited access URL for the document in the context
#[async_trait]
pub trait UrlRefresher: Send + Sync {
    async fn refresh(&self, context: &RecoveryContext) -> Result<String, Fault>;
}

/// Starts (re-)conversion of a document
#[async_trait]
pub trait ConversionTrigger: Send + Sync {
    async fn trigger(&self, document_id: &str) -> Result<(), Fault>;
}

/// Drops cached derived pages for a document
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, document_id: &str) -> Result<(), Fault>;
}

/// Answers whether the network path to the document service works again
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Connectivity probe that fetches a known lightweight URL
pub struct FetchProbe {
    fetcher: Arc<dyn DocumentFetcher>,
    url: String,
}

impl FetchProbe {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, url: impl Into<String>) -> Self {
        Self { fetcher, url: url.into() }
    }
}

#[async_trait]
impl ConnectivityProbe for FetchProbe {
    async fn is_reachable(&self) -> bool {
        match self.fetcher.fetch(&self.url).await {
            Ok(_) => true,
            Err(fault) => {
                tracing::debug!(url = %self.url, %fault, "Connectivity probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct ToggleFetcher {
        online: AtomicBool,
    }

    #[async_trait]
    impl DocumentFetcher for ToggleFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, Fault> {
            if self.online.load(Ordering::SeqCst) {
                Ok(b"ok".to_vec())
            } else {
                Err(Fault::new("failed to fetch"))
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_probe_follows_fetcher() {
        let fetcher = Arc::new(ToggleFetcher { online: AtomicBool::new(false) });
        let probe = FetchProbe::new(fetcher.clone(), "https://files.example/health");

        assert!(!probe.is_reachable().await);
        fetcher.online.store(true, Ordering::SeqCst);
        assert!(probe.is_reachable().await);
    }
}
