//! Recovery engine facade
//!
//! ```text
//! execute(class, op)
//!   -> RetryExecutor (classifier, backoff, class breaker)
//!   -> recoverable? RecoveryStrategyChain -> success: one more protected attempt
//!   -> degradation enabled? DegradationController
//!   -> ClassifiedError
//! ```
//!
//! The engine is an owned value; construct one per application and share it
//! behind an `Arc`.

use std::future::Future;
use std::sync::Arc;

use docrecover_common::error::{ClassifiedError, FailureKind, Fault};
use docrecover_common::resilience::{Clock, ConfigResult, SystemClock};
use tracing::{debug, info, instrument, warn};

use crate::config::{classes, EngineConfig, ResilienceConfig};
use crate::context::{metadata_keys, RecoveryContext, RecoveryOutcome};
use crate::degradation::DegradationController;
use crate::error::RecoveryError;
use crate::health::{ServiceHealth, ServiceHealthTracker};
use crate::retry::{RecoveryObserver, RetryExecutor};
use crate::strategy::{
    CacheInvalidator, CacheRebuildStrategy, ConnectivityProbe, ConversionTrigger,
    NetworkRetryStrategy, RecoveryStrategy, RecoveryStrategyChain, UrlRefreshStrategy,
    UrlRefresher,
};
use crate::worker::{WorkerRequest, WorkerSpawner, WorkerSupervisor};

pub struct RecoveryEngine<C: Clock = SystemClock> {
    config: EngineConfig,
    executor: RetryExecutor<C>,
    chain: RecoveryStrategyChain,
    degradation: DegradationController,
    observers: Vec<Arc<dyn RecoveryObserver>>,
    workers: Option<Arc<WorkerSupervisor>>,
}

impl RecoveryEngine<SystemClock> {
    pub fn builder() -> RecoveryEngineBuilder<SystemClock> {
        RecoveryEngineBuilder::new()
    }

    /// Engine with the given configuration and no strategies
    pub fn new(config: EngineConfig) -> ConfigResult<Self> {
        Self::builder().config(config).build()
    }
}

impl<C: Clock> RecoveryEngine<C> {
    /// Run `operation` with the full recovery pipeline for `class`
    ///
    /// A supplied context keeps its id and metadata but is re-bound to
    /// `class`. Returns the value, a degraded result, or the classified
    /// error with its user message and suggestion.
    #[instrument(skip_all, fields(operation_class = %class))]
    pub async fn execute<T, F, Fut>(
        &self,
        class: &str,
        mut operation: F,
        context: Option<RecoveryContext>,
    ) -> Result<RecoveryOutcome<T>, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Fault>>,
    {
        let mut context = match context {
            Some(mut context) => {
                context.operation_class = class.to_string();
                context
            }
            None => RecoveryContext::new(class),
        };
        let profile = self.config.for_class(class);

        let error = match self
            .executor
            .run(&mut operation, &profile.retry, &mut context, &self.observers)
            .await
        {
            Ok(value) => return Ok(RecoveryOutcome::Completed(value)),
            Err(error) => error,
        };

        let error = if error.kind().is_recoverable() {
            match self.recover(&mut operation, error, &mut context).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) => error,
            }
        } else {
            debug!(kind = %error.kind(), "Failure is not recoverable, skipping strategies");
            error
        };

        if profile.enable_graceful_degradation {
            if let Some(result) = self.degradation.degrade(&error, &context) {
                for observer in &self.observers {
                    observer.on_degradation(&result.strategy_used);
                }
                return Ok(RecoveryOutcome::Degraded(result));
            }
        }

        let error = error.into_classified();
        warn!(
            operation_id = %context.operation_id,
            kind = %error.kind(),
            attempts = context.previous_errors.len(),
            "Recovery failed"
        );
        Err(error)
    }

    /// Send `request` to the worker pool under the recovery pipeline
    pub async fn execute_in_worker(
        &self,
        class: &str,
        request: WorkerRequest,
        context: Option<RecoveryContext>,
    ) -> Result<RecoveryOutcome<serde_json::Value>, ClassifiedError> {
        let Some(workers) = self.workers.as_ref() else {
            return Err(ClassifiedError::new(
                FailureKind::WorkerInitFailed,
                "no worker supervisor configured",
            ));
        };

        let operation = || {
            let workers = Arc::clone(workers);
            let request = request.clone();
            async move { workers.execute(request).await.map_err(Fault::from) }
        };
        self.execute(class, operation, context).await
    }

    /// Walk the strategy chain; on success give the operation one more try
    async fn recover<T, F, Fut>(
        &self,
        operation: &mut F,
        error: RecoveryError,
        context: &mut RecoveryContext,
    ) -> Result<RecoveryOutcome<T>, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Fault>>,
    {
        let result = self.chain.recover(&error, context).await;
        if !result.success {
            debug!(message = ?result.user_message, "Strategy chain could not recover");
            return Err(error);
        }

        if let Some(url) = result.data.as_ref().and_then(|d| d.get("url")).and_then(|u| u.as_str()) {
            context.metadata.insert(metadata_keys::URL.to_string(), url.to_string());
        }

        context.attempt_number += 1;
        let value = self.executor.attempt_once(operation, context).await?;
        info!(strategy = %result.strategy_used, "Operation recovered");
        Ok(RecoveryOutcome::Recovered { value, strategy: result.strategy_used })
    }

    pub fn health(&self, class: &str) -> ServiceHealth {
        self.executor.tracker().snapshot(class)
    }

    pub fn health_snapshot(&self) -> Vec<ServiceHealth> {
        self.executor.tracker().snapshot_all()
    }

    /// Clear breaker and health state for one class
    pub fn reset(&self, class: &str) {
        self.executor.tracker().reset(class);
    }

    pub fn config_for(&self, class: &str) -> &ResilienceConfig {
        self.config.for_class(class)
    }

    pub fn tracker(&self) -> &Arc<ServiceHealthTracker<C>> {
        self.executor.tracker()
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.chain.names()
    }

    pub fn workers(&self) -> Option<&Arc<WorkerSupervisor>> {
        self.workers.as_ref()
    }

    /// Stop the worker pool, if any
    pub async fn shutdown(&self) {
        if let Some(workers) = &self.workers {
            workers.shutdown().await;
        }
    }
}

/// Where the engine's worker pool comes from
enum WorkerPool {
    /// Supervisor built and configured by the caller
    Supervisor(Arc<WorkerSupervisor>),
    /// Supervisor built at `build()` from the `render` class limits
    Spawner(Arc<dyn WorkerSpawner>),
}

/// Assembles a [`RecoveryEngine`]
pub struct RecoveryEngineBuilder<C: Clock = SystemClock> {
    config: EngineConfig,
    clock: Arc<C>,
    chain: RecoveryStrategyChain,
    observers: Vec<Arc<dyn RecoveryObserver>>,
    workers: Option<WorkerPool>,
}

impl RecoveryEngineBuilder<SystemClock> {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::recommended(),
            clock: Arc::new(SystemClock),
            chain: RecoveryStrategyChain::new(),
            observers: Vec::new(),
            workers: None,
        }
    }
}

impl Default for RecoveryEngineBuilder<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RecoveryEngineBuilder<C> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Drive breaker timing from another clock
    pub fn with_clock<D: Clock>(self, clock: Arc<D>) -> RecoveryEngineBuilder<D> {
        RecoveryEngineBuilder {
            config: self.config,
            clock,
            chain: self.chain,
            observers: self.observers,
            workers: self.workers,
        }
    }

    pub fn strategy(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.chain.register(strategy);
        self
    }

    pub fn connectivity_probe(self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.strategy(Arc::new(NetworkRetryStrategy::new(probe)))
    }

    pub fn url_refresher(self, refresher: Arc<dyn UrlRefresher>) -> Self {
        self.strategy(Arc::new(UrlRefreshStrategy::new(refresher)))
    }

    pub fn cache_rebuild(
        self,
        invalidator: Arc<dyn CacheInvalidator>,
        trigger: Option<Arc<dyn ConversionTrigger>>,
    ) -> Self {
        let mut strategy = CacheRebuildStrategy::new(invalidator);
        if let Some(trigger) = trigger {
            strategy = strategy.with_trigger(trigger);
        }
        self.strategy(Arc::new(strategy))
    }

    pub fn observer(mut self, observer: Arc<dyn RecoveryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Use a supervisor that was configured elsewhere
    ///
    /// Its limits are its own; the engine's `worker` settings do not apply.
    pub fn worker_supervisor(mut self, supervisor: Arc<WorkerSupervisor>) -> Self {
        self.workers = Some(WorkerPool::Supervisor(supervisor));
        self
    }

    /// Run a worker pool built from the `render` class's `worker` limits
    pub fn worker_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.workers = Some(WorkerPool::Spawner(spawner));
        self
    }

    pub fn build(self) -> ConfigResult<RecoveryEngine<C>> {
        self.config.validate()?;

        let workers = match self.workers {
            Some(WorkerPool::Supervisor(supervisor)) => Some(supervisor),
            Some(WorkerPool::Spawner(spawner)) => {
                let limits = self.config.for_class(classes::RENDER).worker.clone();
                let clock: Arc<dyn Clock> = self.clock.clone();
                Some(Arc::new(WorkerSupervisor::with_clock(limits, spawner, clock)?))
            }
            None => None,
        };
        let tracker = ServiceHealthTracker::with_clock(&self.config, self.clock)?;

        debug!(
            strategies = ?self.chain.names(),
            classes = self.config.classes.len(),
            "Recovery engine built"
        );
        Ok(RecoveryEngine {
            config: self.config,
            executor: RetryExecutor::new(Arc::new(tracker)),
            chain: self.chain,
            degradation: DegradationController::new(),
            observers: self.observers,
            workers,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use docrecover_common::error::FailureKind;
    use docrecover_common::resilience::RetryPolicy;
    use docrecover_common::testing::{RecordingObserver, ScriptedOperation};

    use super::*;

    fn fast_config(degrade: bool) -> EngineConfig {
        let mut profile = ResilienceConfig::default_profile();
        profile.retry = RetryPolicy::builder()
            .max_attempts(3)
            .base_delay(Duration::from_millis(10))
            .jitter(false)
            .build()
            .unwrap();
        profile.enable_graceful_degradation = degrade;
        EngineConfig::new(profile)
    }

    struct AlwaysReachable(AtomicU32);

    #[async_trait]
    impl ConnectivityProbe for AlwaysReachable {
        async fn is_reachable(&self) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_failure() {
        let engine = RecoveryEngine::new(fast_config(true)).unwrap();
        let op = ScriptedOperation::new(vec![Ok("pages")]);

        let outcome = engine.execute("fetch-pages", || op.call(), None).await.unwrap();

        assert_eq!(outcome, RecoveryOutcome::Completed("pages"));
        assert!(engine.health("fetch-pages").healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_success_gets_one_more_attempt() {
        let probe = Arc::new(AlwaysReachable(AtomicU32::new(0)));
        let engine = RecoveryEngine::builder()
            .config(fast_config(true))
            .connectivity_probe(probe.clone())
            .build()
            .unwrap();
        let op = ScriptedOperation::failing_then(3, FailureKind::NetworkFailure, "pages");

        let outcome = engine.execute("fetch-pages", || op.call(), None).await.unwrap();

        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered { value: "pages", strategy: "network-retry".to_string() }
        );
        assert_eq!(op.invocations(), 4);
        assert_eq!(probe.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degrades_after_chain_fails() {
        let observer = RecordingObserver::new();
        let engine = RecoveryEngine::builder()
            .config(fast_config(true))
            .observer(Arc::new(observer.clone()))
            .build()
            .unwrap();
        let op = ScriptedOperation::<()>::always_failing(Fault::tagged(
            FailureKind::ConversionFailed,
            "converter crashed",
        ));

        let outcome = engine.execute("convert", || op.call(), None).await.unwrap();

        assert!(outcome.is_degraded());
        assert_eq!(outcome.strategy(), Some("degraded-static-view"));
        assert_eq!(observer.degradations(), vec!["degraded-static-view".to_string()]);
        assert_eq!(op.invocations(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degradation_disabled_returns_error() {
        let engine = RecoveryEngine::new(fast_config(false)).unwrap();
        let op = ScriptedOperation::<()>::always_failing(Fault::new("network error"));

        let err = engine.execute("fetch-pages", || op.call(), None).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::NetworkFailure);
        assert!(!err.user_message().is_empty());
        assert!(!err.suggestion().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_recoverable_is_returned_immediately() {
        let observer = RecordingObserver::new();
        let engine = RecoveryEngine::builder()
            .config(fast_config(true))
            .observer(Arc::new(observer.clone()))
            .build()
            .unwrap();
        let op = ScriptedOperation::<()>::always_failing(Fault::new("Permission denied"));

        let err = engine.execute("storage", || op.call(), None).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::PermissionDenied);
        assert_eq!(op.invocations(), 1);
        assert!(observer.retries().is_empty());
        assert!(observer.degradations().is_empty());
    }

    #[tokio::test]
    async fn test_execute_in_worker_without_pool() {
        let engine = RecoveryEngine::new(fast_config(true)).unwrap();

        let err = engine.execute_in_worker("render", WorkerRequest::Ping, None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::WorkerInitFailed);
    }

    #[test]
    fn test_builder_orders_builtin_strategies() {
        struct Noop;

        #[async_trait]
        impl UrlRefresher for Noop {
            async fn refresh(&self, _context: &RecoveryContext) -> Result<String, Fault> {
                Ok(String::new())
            }
        }

        #[async_trait]
        impl CacheInvalidator for Noop {
            async fn invalidate(&self, _document_id: &str) -> Result<(), Fault> {
                Ok(())
            }
        }

        let engine = RecoveryEngine::builder()
            .cache_rebuild(Arc::new(Noop), None)
            .url_refresher(Arc::new(Noop))
            .connectivity_probe(Arc::new(AlwaysReachable(AtomicU32::new(0))))
            .build()
            .unwrap();

        assert_eq!(engine.strategy_names(), vec!["network-retry", "url-refresh", "cache-rebuild"]);
        assert_eq!(engine.config_for("convert").retry.max_attempts, 5);
    }
}
