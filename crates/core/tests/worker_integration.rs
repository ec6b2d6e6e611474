//! Worker pool supervision through the recovery engine

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docrecover_common::error::FailureKind;
use docrecover_common::resilience::RetryPolicy;
use docrecover_common::{assert_error_contains, assert_failure_kind};
use docrecover_core::config::{apply_overrides_from, classes};
use docrecover_core::worker::WorkerProcess;
use docrecover_core::{
    EngineConfig, RecoveryEngine, RecoveryOutcome, ResilienceConfig, WorkerFault,
    WorkerRecoveryConfig, WorkerRequest, WorkerSpawner,
};
use serde_json::{json, Value};

#[derive(Clone, Copy)]
enum Behavior {
    Healthy,
    Crash,
    Hang,
}

struct MockWorker {
    id: String,
    behavior: Behavior,
}

#[async_trait]
impl WorkerProcess for MockWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, request: WorkerRequest) -> Result<Value, WorkerFault> {
        match self.behavior {
            Behavior::Healthy => Ok(json!({ "worker": self.id, "request": request })),
            Behavior::Crash => Err(WorkerFault::Crashed("renderer exited with signal 11".into())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            }
        }
    }

    async fn terminate(&self) {}
}

/// Hands out workers following a per-spawn script; the last entry repeats
struct ScriptedSpawner {
    script: Vec<Behavior>,
    spawned: AtomicU32,
}

impl ScriptedSpawner {
    fn new(script: Vec<Behavior>) -> Arc<Self> {
        Arc::new(Self { script, spawned: AtomicU32::new(0) })
    }

    fn spawned(&self) -> u32 {
        self.spawned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerSpawner for ScriptedSpawner {
    async fn spawn(&self, id: &str) -> Result<Arc<dyn WorkerProcess>, WorkerFault> {
        let index = self.spawned.fetch_add(1, Ordering::SeqCst) as usize;
        let behavior = self.script[index.min(self.script.len() - 1)];
        Ok(Arc::new(MockWorker { id: id.to_string(), behavior }))
    }
}

fn worker_config(max_restarts: u32) -> WorkerRecoveryConfig {
    WorkerRecoveryConfig {
        pool_size: 1,
        max_restarts,
        operation_timeout: Duration::from_secs(1),
        ping_timeout: Duration::from_millis(200),
        health_check_interval: Duration::from_secs(5),
    }
}

fn render_config(max_restarts: u32, degrade: bool) -> EngineConfig {
    let mut profile = ResilienceConfig::default_profile();
    profile.retry = RetryPolicy::builder()
        .max_attempts(5)
        .base_delay(Duration::from_millis(50))
        .jitter(false)
        .build()
        .unwrap();
    profile.worker = worker_config(max_restarts);
    profile.enable_graceful_degradation = degrade;
    EngineConfig::default().with_class(classes::RENDER, profile)
}

fn engine(spawner: Arc<ScriptedSpawner>, max_restarts: u32, degrade: bool) -> RecoveryEngine {
    RecoveryEngine::builder()
        .config(render_config(max_restarts, degrade))
        .worker_spawner(spawner)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_healthy_worker_completes() {
    let spawner = ScriptedSpawner::new(vec![Behavior::Healthy]);
    let engine = engine(spawner.clone(), 3, true);

    let outcome = engine.execute_in_worker("render", WorkerRequest::Ping, None).await.unwrap();

    let RecoveryOutcome::Completed(value) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(value["request"]["type"], "ping");
    assert_eq!(spawner.spawned(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_crashed_worker_is_replaced() {
    let spawner = ScriptedSpawner::new(vec![Behavior::Crash, Behavior::Healthy]);
    let engine = engine(spawner.clone(), 3, true);

    let outcome = engine.execute_in_worker("render", WorkerRequest::Ping, None).await.unwrap();

    assert_eq!(outcome.value().unwrap()["worker"], "worker-0-1");
    assert_eq!(spawner.spawned(), 2);
    let status = engine.workers().unwrap().status().await;
    assert_eq!(status.restarts_used, 0);
    assert_eq!(status.workers[0].restart_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_budget_bounds_respawns() {
    let spawner = ScriptedSpawner::new(vec![Behavior::Crash]);
    let engine = engine(spawner.clone(), 2, false);

    let result = engine.execute_in_worker("render", WorkerRequest::Ping, None).await;
    assert_failure_kind!(result, FailureKind::WorkerInitFailed);
    assert_error_contains!(result, "restart budget exhausted");
    assert_eq!(spawner.spawned(), 3);

    // Terminal: later calls fail without spawning
    let result = engine.execute_in_worker("render", WorkerRequest::Ping, None).await;
    assert_failure_kind!(result, FailureKind::WorkerInitFailed);
    assert_eq!(spawner.spawned(), 3);
    assert!(engine.workers().unwrap().status().await.exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_pool_degrades_to_queue() {
    let spawner = ScriptedSpawner::new(vec![Behavior::Crash]);
    let engine = engine(spawner.clone(), 1, true);

    let outcome = engine.execute_in_worker("render", WorkerRequest::Ping, None).await.unwrap();

    assert_eq!(outcome.strategy(), Some("degraded-queued-processing"));
    assert_eq!(spawner.spawned(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hung_call_times_out_and_is_retried_on_fresh_worker() {
    let spawner = ScriptedSpawner::new(vec![Behavior::Hang, Behavior::Healthy]);
    let engine = engine(spawner.clone(), 3, false);

    let outcome = engine
        .execute_in_worker(
            "render",
            WorkerRequest::Render { document_id: "doc-1".into(), page: 2, scale: 1.0 },
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.value().unwrap()["worker"], "worker-0-1");
    let health = engine.health("render");
    assert_eq!(health.failure_count, 1);
    assert_eq!(health.last_error_kind, Some(FailureKind::NetworkTimeout));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_refuses_further_work() -> anyhow::Result<()> {
    let spawner = ScriptedSpawner::new(vec![Behavior::Healthy]);
    let engine = engine(spawner, 3, false);
    engine.execute_in_worker("render", WorkerRequest::Ping, None).await?;

    engine.shutdown().await;

    let result = engine.execute_in_worker("render", WorkerRequest::Ping, None).await;
    assert_failure_kind!(result, FailureKind::WorkerInitFailed);
    assert_error_contains!(result, "shut down");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pool_limits_come_from_render_class_config() {
    let spawner = ScriptedSpawner::new(vec![Behavior::Crash]);
    let mut config = render_config(3, false);
    apply_overrides_from(&mut config, |name| {
        (name == "DOCRECOVER_MAX_RESTARTS").then(|| "1".to_string())
    })
    .unwrap();
    let engine = RecoveryEngine::builder()
        .config(config)
        .worker_spawner(spawner.clone())
        .build()
        .unwrap();

    assert_eq!(engine.workers().unwrap().status().await.max_restarts, 1);

    let result = engine.execute_in_worker("render", WorkerRequest::Ping, None).await;
    assert_failure_kind!(result, FailureKind::WorkerInitFailed);
    assert_eq!(spawner.spawned(), 2);
}
