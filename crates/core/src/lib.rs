//! # docrecover core
//!
//! Recovery pipeline for document operations:
//!
//! - [`retry`]: bounded retries with kind-aware backoff behind per-class
//!   circuit breakers
//! - [`strategy`]: priority-ordered remediation (connectivity, URL refresh,
//!   cache rebuild) behind capability ports
//! - [`worker`]: supervised rendering workers with a restart budget
//! - [`degradation`]: reduced-capability fallbacks
//! - [`health`]: per-class health snapshots and manual reset
//! - [`engine`]: the facade tying them together
//!
//! ## Architecture Principles
//! - Only depends on `docrecover-common` for primitives
//! - Platform access (network, storage, caches) only through ports
//! - Everything is an owned value; there are no global singletons
//!
//! ```no_run
//! use docrecover_common::error::Fault;
//! use docrecover_core::{EngineConfig, RecoveryEngine, RecoveryOutcome};
//!
//! # async fn fetch_pages() -> Result<Vec<u8>, Fault> { Ok(Vec::new()) }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = RecoveryEngine::new(EngineConfig::recommended())?;
//!
//! match engine.execute("fetch-pages", fetch_pages, None).await {
//!     Ok(RecoveryOutcome::Degraded(result)) => println!("{:?}", result.user_message),
//!     Ok(outcome) => println!("{} bytes", outcome.value().map_or(0, Vec::len)),
//!     Err(error) => println!("{} {}", error.user_message(), error.suggestion()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod degradation;
pub mod engine;
pub mod error;
pub mod health;
pub mod retry;
pub mod strategy;
pub mod worker;

pub use config::{classes, EngineConfig, ResilienceConfig, WorkerRecoveryConfig};
pub use context::{RecoveryContext, RecoveryOutcome, RecoveryResult};
pub use degradation::{DegradationController, DegradationMode};
pub use engine::{RecoveryEngine, RecoveryEngineBuilder};
pub use error::RecoveryError;
pub use health::{ServiceHealth, ServiceHealthTracker};
pub use retry::{FnObserver, RecoveryObserver, RetryExecutor};
pub use strategy::{
    CacheInvalidator, ConnectivityProbe, ConversionTrigger, DocumentFetcher, RecoveryStrategy,
    RecoveryStrategyChain, UrlRefresher,
};
pub use worker::{WorkerFault, WorkerRequest, WorkerSpawner, WorkerSupervisor};
