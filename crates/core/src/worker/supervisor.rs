//! Worker pool supervision
//!
//! The supervisor owns a fixed number of slots. Each slot holds at most one
//! [`WorkerHandle`] behind an async mutex, so a slot serves one call at a
//! time and concurrent callers either find an idle slot or queue on one.
//!
//! Workers are never repaired in place: a crash, a protocol error, a failed
//! ping or a timed-out call marks the handle unhealthy, and the next
//! [`WorkerSupervisor::get_worker`] on that slot terminates and replaces it.
//! Replacements draw on a shared restart budget which a successful call
//! refills. Once the budget is spent the supervisor stops for good and
//! reports [`WorkerFault::RestartBudgetExhausted`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use docrecover_common::resilience::{Clock, ConfigResult, SystemClock};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::ports::{WorkerFault, WorkerProcess, WorkerRequest, WorkerSpawner};
use crate::config::WorkerRecoveryConfig;

/// A live worker as seen by the supervisor
pub struct WorkerHandle {
    pub id: String,
    process: Arc<dyn WorkerProcess>,
    pub healthy: bool,
    /// Replacements that happened in this slot so far
    pub restart_count: u32,
    pub last_health_check_at: Option<DateTime<Utc>>,
}

impl WorkerHandle {
    pub fn process(&self) -> &Arc<dyn WorkerProcess> {
        &self.process
    }
}

#[derive(Default)]
struct Slot {
    index: usize,
    handle: Option<WorkerHandle>,
    spawned: bool,
    restarts: u32,
}

#[derive(Debug, Default)]
struct RestartBudget {
    used: u32,
    exhausted: bool,
}

/// Exclusive use of one worker slot
///
/// Dropping the lease returns the slot to the pool.
pub struct WorkerLease {
    guard: OwnedMutexGuard<Slot>,
}

impl WorkerLease {
    pub fn slot(&self) -> usize {
        self.guard.index
    }

    pub fn worker_id(&self) -> Option<&str> {
        self.guard.handle.as_ref().map(|h| h.id.as_str())
    }

    pub fn is_healthy(&self) -> bool {
        self.guard.handle.as_ref().is_some_and(|h| h.healthy)
    }

    fn process(&self) -> Result<Arc<dyn WorkerProcess>, WorkerFault> {
        match self.guard.handle.as_ref() {
            Some(handle) if handle.healthy => Ok(Arc::clone(&handle.process)),
            _ => Err(WorkerFault::Crashed("worker slot has no healthy worker".to_string())),
        }
    }

    fn mark_unhealthy(&mut self) {
        if let Some(handle) = self.guard.handle.as_mut() {
            handle.healthy = false;
        }
    }
}

/// Point-in-time view of one slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub slot: usize,
    /// A call is in flight; the other fields are unknown
    pub busy: bool,
    pub worker_id: Option<String>,
    pub healthy: bool,
    pub restart_count: u32,
    pub last_health_check_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the whole pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorStatus {
    pub restarts_used: u32,
    pub max_restarts: u32,
    pub exhausted: bool,
    pub shut_down: bool,
    pub workers: Vec<WorkerStatus>,
}

pub struct WorkerSupervisor {
    config: WorkerRecoveryConfig,
    spawner: Arc<dyn WorkerSpawner>,
    slots: Vec<Arc<tokio::sync::Mutex<Slot>>>,
    budget: Mutex<RestartBudget>,
    next_slot: AtomicUsize,
    spawned_total: AtomicU64,
    shutdown: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl WorkerSupervisor {
    pub fn new(config: WorkerRecoveryConfig, spawner: Arc<dyn WorkerSpawner>) -> ConfigResult<Self> {
        Self::with_clock(config, spawner, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: WorkerRecoveryConfig,
        spawner: Arc<dyn WorkerSpawner>,
        clock: Arc<dyn Clock>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let slots = (0..config.pool_size)
            .map(|index| Arc::new(tokio::sync::Mutex::new(Slot { index, ..Slot::default() })))
            .collect();

        Ok(Self {
            config,
            spawner,
            slots,
            budget: Mutex::new(RestartBudget::default()),
            next_slot: AtomicUsize::new(0),
            spawned_total: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            clock,
        })
    }

    pub fn config(&self) -> &WorkerRecoveryConfig {
        &self.config
    }

    /// Lease a slot with a healthy worker, spawning or replacing as needed
    pub async fn get_worker(&self) -> Result<WorkerLease, WorkerFault> {
        self.ensure_running()?;

        let mut lease = WorkerLease { guard: self.acquire_slot().await };
        // Shutdown may have happened while we queued
        self.ensure_running()?;
        self.ensure_worker(&mut lease.guard).await?;
        Ok(lease)
    }

    /// Run `op` against the leased worker, bounded by `operation_timeout`
    ///
    /// The call runs on its own task. On timeout that task is detached and
    /// its eventual result discarded.
    pub async fn execute_with_timeout<T, F, Fut>(
        &self,
        lease: &mut WorkerLease,
        op: F,
    ) -> Result<T, WorkerFault>
    where
        F: FnOnce(Arc<dyn WorkerProcess>) -> Fut,
        Fut: Future<Output = Result<T, WorkerFault>> + Send + 'static,
        T: Send + 'static,
    {
        let process = lease.process()?;
        let task = tokio::spawn(op(process));
        let limit = self.config.operation_timeout;

        let outcome = match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(WorkerFault::Crashed(format!("worker call aborted: {join_error}"))),
            Err(_) => {
                warn!(slot = lease.slot(), timeout_ms = limit.as_millis() as u64, "Worker call timed out");
                Err(WorkerFault::Timeout(limit))
            }
        };

        match outcome {
            Ok(value) => {
                self.lock_budget().used = 0;
                Ok(value)
            }
            Err(fault) if fault.poisons_worker() => Err(self.on_poisoned(lease, fault)),
            Err(fault) => Err(fault),
        }
    }

    /// Lease a worker and send it one request
    #[instrument(skip_all)]
    pub async fn execute(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerFault> {
        let mut lease = self.get_worker().await?;
        debug!(slot = lease.slot(), worker_id = lease.worker_id(), "Dispatching worker request");
        self.execute_with_timeout(&mut lease, move |process| async move {
            process.call(request).await
        })
        .await
    }

    /// Ping every idle worker and replace the ones that fail
    ///
    /// Busy slots are skipped. Returns the number of workers replaced.
    pub async fn check_health(&self) -> usize {
        if self.ensure_running().is_err() {
            return 0;
        }

        let mut replaced = 0;
        for slot in &self.slots {
            let Ok(mut guard) = Arc::clone(slot).try_lock_owned() else {
                continue;
            };
            let Some(handle) = guard.handle.as_mut() else {
                continue;
            };

            if handle.healthy {
                let ping = tokio::time::timeout(self.config.ping_timeout, handle.process.ping()).await;
                handle.last_health_check_at = Some(self.now_utc());
                match ping {
                    Ok(Ok(())) => continue,
                    Ok(Err(fault)) => warn!(worker_id = %handle.id, %fault, "Worker failed liveness ping"),
                    Err(_) => warn!(worker_id = %handle.id, "Worker liveness ping timed out"),
                }
                handle.healthy = false;
            }

            match self.ensure_worker(&mut guard).await {
                Ok(()) => replaced += 1,
                Err(fault) => {
                    warn!(slot = guard.index, %fault, "Could not replace unhealthy worker");
                    if fault.is_terminal() {
                        break;
                    }
                }
            }
        }
        replaced
    }

    /// Start the periodic liveness loop
    pub fn spawn_health_monitor(self: &Arc<Self>) -> Result<WorkerHealthMonitor, MonitorError> {
        let mut monitor = WorkerHealthMonitor::new(Arc::clone(self), self.config.health_check_interval);
        monitor.start()?;
        Ok(monitor)
    }

    pub async fn status(&self) -> SupervisorStatus {
        let mut workers = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter().enumerate() {
            let status = match slot.try_lock() {
                Ok(guard) => WorkerStatus {
                    slot: index,
                    busy: false,
                    worker_id: guard.handle.as_ref().map(|h| h.id.clone()),
                    healthy: guard.handle.as_ref().is_some_and(|h| h.healthy),
                    restart_count: guard.restarts,
                    last_health_check_at: guard.handle.as_ref().and_then(|h| h.last_health_check_at),
                },
                Err(_) => WorkerStatus {
                    slot: index,
                    busy: true,
                    worker_id: None,
                    healthy: false,
                    restart_count: 0,
                    last_health_check_at: None,
                },
            };
            workers.push(status);
        }

        let budget = self.lock_budget();
        SupervisorStatus {
            restarts_used: budget.used,
            max_restarts: self.config.max_restarts,
            exhausted: budget.exhausted,
            shut_down: self.shutdown.is_cancelled(),
            workers,
        }
    }

    /// Total workers started, including replacements
    pub fn spawned_total(&self) -> u64 {
        self.spawned_total.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Terminate all workers and refuse further work
    ///
    /// Waits for in-flight calls to release their slots.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        join_all(self.slots.iter().map(|slot| async move {
            let mut guard = slot.lock().await;
            if let Some(handle) = guard.handle.take() {
                handle.process.terminate().await;
            }
        }))
        .await;
        info!(workers = self.slots.len(), "Worker supervisor shut down");
    }

    fn ensure_running(&self) -> Result<(), WorkerFault> {
        if self.shutdown.is_cancelled() {
            return Err(WorkerFault::Shutdown);
        }
        let budget = self.lock_budget();
        if budget.exhausted {
            return Err(WorkerFault::RestartBudgetExhausted { restarts: budget.used });
        }
        Ok(())
    }

    async fn acquire_slot(&self) -> OwnedMutexGuard<Slot> {
        for slot in &self.slots {
            if let Ok(guard) = Arc::clone(slot).try_lock_owned() {
                return guard;
            }
        }
        let index = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        Arc::clone(&self.slots[index]).lock_owned().await
    }

    async fn ensure_worker(&self, slot: &mut Slot) -> Result<(), WorkerFault> {
        if slot.handle.as_ref().is_some_and(|h| h.healthy) {
            return Ok(());
        }

        if let Some(stale) = slot.handle.take() {
            debug!(worker_id = %stale.id, "Terminating unhealthy worker");
            stale.process.terminate().await;
        }

        if slot.spawned {
            self.consume_restart()?;
            slot.restarts += 1;
        }
        slot.spawned = true;

        let sequence = self.spawned_total.fetch_add(1, Ordering::Relaxed);
        let id = format!("worker-{}-{sequence}", slot.index);
        let process = self.spawner.spawn(&id).await.map_err(|fault| {
            warn!(worker_id = %id, %fault, "Worker spawn failed");
            fault
        })?;

        info!(worker_id = %id, slot = slot.index, restarts = slot.restarts, "Worker started");
        slot.handle = Some(WorkerHandle {
            id,
            process,
            healthy: true,
            restart_count: slot.restarts,
            last_health_check_at: None,
        });
        Ok(())
    }

    fn consume_restart(&self) -> Result<(), WorkerFault> {
        let mut budget = self.lock_budget();
        if budget.used >= self.config.max_restarts {
            budget.exhausted = true;
            return Err(WorkerFault::RestartBudgetExhausted { restarts: budget.used });
        }
        budget.used += 1;
        Ok(())
    }

    /// Mark the leased worker for replacement and decide what the caller sees
    fn on_poisoned(&self, lease: &mut WorkerLease, fault: WorkerFault) -> WorkerFault {
        lease.mark_unhealthy();
        warn!(slot = lease.slot(), worker_id = lease.worker_id(), %fault, "Worker marked unhealthy");

        if matches!(fault, WorkerFault::Timeout(_)) {
            return fault;
        }

        let mut budget = self.lock_budget();
        if budget.used >= self.config.max_restarts {
            budget.exhausted = true;
            warn!(restarts = budget.used, "Worker restart budget exhausted");
            return WorkerFault::RestartBudgetExhausted { restarts: budget.used };
        }
        fault
    }

    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }

    fn lock_budget(&self) -> MutexGuard<'_, RestartBudget> {
        self.budget.lock().unwrap_or_else(|poisoned| {
            warn!("Worker restart budget lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Errors from the health monitor lifecycle
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("worker health monitor already running")]
    AlreadyRunning,
    #[error("worker health monitor did not stop in time")]
    ShutdownTimeout,
    #[error("worker health monitor task failed: {0}")]
    Join(String),
}

/// Background liveness loop for a supervisor
pub struct WorkerHealthMonitor {
    supervisor: Arc<WorkerSupervisor>,
    interval: Duration,
    task_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl WorkerHealthMonitor {
    pub fn new(supervisor: Arc<WorkerSupervisor>, interval: Duration) -> Self {
        Self { supervisor, interval, task_handle: None, cancellation: CancellationToken::new() }
    }

    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.task_handle.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let supervisor = Arc::clone(&self.supervisor);
        let cancel = self.cancellation.clone();
        let interval = self.interval;

        info!(interval_ms = interval.as_millis() as u64, "Starting worker health monitor");
        self.task_handle = Some(tokio::spawn(health_worker(supervisor, interval, cancel)));
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .map_err(|_| MonitorError::ShutdownTimeout)?
                .map_err(|e| MonitorError::Join(e.to_string()))?;
        }

        info!("Worker health monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some() && !self.cancellation.is_cancelled()
    }
}

async fn health_worker(
    supervisor: Arc<WorkerSupervisor>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Worker health monitor shutting down");
                break;
            }
            _ = supervisor.shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let replaced = supervisor.check_health().await;
                if replaced > 0 {
                    info!(replaced, "Health check replaced workers");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    /// Worker whose behavior is switched from the test
    struct FakeWorker {
        id: String,
        crash: AtomicBool,
        hang: AtomicBool,
        terminated: AtomicBool,
    }

    #[async_trait]
    impl WorkerProcess for FakeWorker {
        fn id(&self) -> &str {
            &self.id
        }

        async fn call(&self, request: WorkerRequest) -> Result<Value, WorkerFault> {
            if self.hang.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.crash.load(Ordering::SeqCst) {
                return Err(WorkerFault::Crashed("segfault".into()));
            }
            Ok(json!({ "worker": self.id, "request": request }))
        }

        async fn terminate(&self) {
            self.terminated.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeSpawner {
        crash: AtomicBool,
        hang: AtomicBool,
        spawned: Mutex<Vec<Arc<FakeWorker>>>,
    }

    #[async_trait]
    impl WorkerSpawner for FakeSpawner {
        async fn spawn(&self, id: &str) -> Result<Arc<dyn WorkerProcess>, WorkerFault> {
            let worker = Arc::new(FakeWorker {
                id: id.to_string(),
                crash: AtomicBool::new(self.crash.load(Ordering::SeqCst)),
                hang: AtomicBool::new(self.hang.load(Ordering::SeqCst)),
                terminated: AtomicBool::new(false),
            });
            self.spawned.lock().unwrap().push(Arc::clone(&worker));
            Ok(worker)
        }
    }

    fn config(max_restarts: u32) -> WorkerRecoveryConfig {
        WorkerRecoveryConfig {
            pool_size: 1,
            max_restarts,
            operation_timeout: Duration::from_secs(2),
            ping_timeout: Duration::from_millis(500),
            health_check_interval: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_spawns_lazily_and_reuses_worker() {
        let spawner = Arc::new(FakeSpawner::default());
        let supervisor = WorkerSupervisor::new(config(3), spawner.clone()).unwrap();
        assert_eq!(supervisor.spawned_total(), 0);

        supervisor.execute(WorkerRequest::Ping).await.unwrap();
        let value = supervisor.execute(WorkerRequest::Ping).await.unwrap();

        assert_eq!(value["worker"], "worker-0-0");
        assert_eq!(supervisor.spawned_total(), 1);
    }

    #[tokio::test]
    async fn test_crash_replaces_worker_until_budget_exhausted() {
        let spawner = Arc::new(FakeSpawner::default());
        spawner.crash.store(true, Ordering::SeqCst);
        let supervisor = WorkerSupervisor::new(config(2), spawner.clone()).unwrap();

        for _ in 0..2 {
            let err = supervisor.execute(WorkerRequest::Ping).await.unwrap_err();
            assert!(matches!(err, WorkerFault::Crashed(_)));
        }
        let err = supervisor.execute(WorkerRequest::Ping).await.unwrap_err();
        assert_eq!(err, WorkerFault::RestartBudgetExhausted { restarts: 2 });

        // Terminal: nothing more is spawned
        let err = supervisor.get_worker().await.err().unwrap();
        assert!(err.is_terminal());
        assert_eq!(supervisor.spawned_total(), 3);

        let spawned = spawner.spawned.lock().unwrap();
        assert!(spawned[0].terminated.load(Ordering::SeqCst));
        assert!(spawned[1].terminated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_success_refills_restart_budget() {
        let spawner = Arc::new(FakeSpawner::default());
        spawner.crash.store(true, Ordering::SeqCst);
        let supervisor = WorkerSupervisor::new(config(1), spawner.clone()).unwrap();

        assert!(supervisor.execute(WorkerRequest::Ping).await.is_err());
        spawner.crash.store(false, Ordering::SeqCst);
        supervisor.execute(WorkerRequest::Ping).await.unwrap();
        assert_eq!(supervisor.status().await.restarts_used, 0);

        spawner.spawned.lock().unwrap().last().unwrap().crash.store(true, Ordering::SeqCst);
        let err = supervisor.execute(WorkerRequest::Ping).await.unwrap_err();
        assert!(matches!(err, WorkerFault::Crashed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_detaches_call_and_marks_unhealthy() {
        let spawner = Arc::new(FakeSpawner::default());
        spawner.hang.store(true, Ordering::SeqCst);
        let supervisor = WorkerSupervisor::new(config(3), spawner.clone()).unwrap();

        let err = supervisor.execute(WorkerRequest::Ping).await.unwrap_err();
        assert_eq!(err, WorkerFault::Timeout(Duration::from_secs(2)));

        let status = supervisor.status().await;
        assert!(!status.workers[0].healthy);
        assert!(!status.exhausted);

        spawner.hang.store(false, Ordering::SeqCst);
        let value = supervisor.execute(WorkerRequest::Ping).await.unwrap();
        assert_eq!(value["worker"], "worker-0-1");
    }

    #[tokio::test]
    async fn test_task_error_keeps_worker() {
        struct Picky;

        #[async_trait]
        impl WorkerProcess for Picky {
            fn id(&self) -> &str {
                "picky"
            }

            async fn call(&self, _request: WorkerRequest) -> Result<Value, WorkerFault> {
                Err(WorkerFault::Task("invalid pdf structure".into()))
            }

            async fn terminate(&self) {}
        }

        struct PickySpawner;

        #[async_trait]
        impl WorkerSpawner for PickySpawner {
            async fn spawn(&self, _id: &str) -> Result<Arc<dyn WorkerProcess>, WorkerFault> {
                Ok(Arc::new(Picky))
            }
        }

        let supervisor = WorkerSupervisor::new(config(0), Arc::new(PickySpawner)).unwrap();
        let err = supervisor.execute(WorkerRequest::Ping).await.unwrap_err();

        assert!(matches!(err, WorkerFault::Task(_)));
        assert!(supervisor.status().await.workers[0].healthy);
    }

    #[tokio::test]
    async fn test_check_health_replaces_failed_ping() {
        let spawner = Arc::new(FakeSpawner::default());
        let supervisor = WorkerSupervisor::new(config(3), spawner.clone()).unwrap();
        supervisor.execute(WorkerRequest::Ping).await.unwrap();

        assert_eq!(supervisor.check_health().await, 0);
        assert!(supervisor.status().await.workers[0].last_health_check_at.is_some());

        spawner.spawned.lock().unwrap()[0].crash.store(true, Ordering::SeqCst);
        assert_eq!(supervisor.check_health().await, 1);
        assert_eq!(supervisor.status().await.workers[0].worker_id.as_deref(), Some("worker-0-1"));
    }

    #[tokio::test]
    async fn test_shutdown_terminates_and_refuses_work() {
        let spawner = Arc::new(FakeSpawner::default());
        let supervisor = WorkerSupervisor::new(config(3), spawner.clone()).unwrap();
        supervisor.execute(WorkerRequest::Ping).await.unwrap();

        supervisor.shutdown().await;

        assert!(spawner.spawned.lock().unwrap()[0].terminated.load(Ordering::SeqCst));
        let err = supervisor.execute(WorkerRequest::Ping).await.unwrap_err();
        assert_eq!(err, WorkerFault::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_monitor_lifecycle() {
        let spawner = Arc::new(FakeSpawner::default());
        let supervisor = Arc::new(WorkerSupervisor::new(config(3), spawner.clone()).unwrap());
        supervisor.execute(WorkerRequest::Ping).await.unwrap();
        spawner.spawned.lock().unwrap()[0].crash.store(true, Ordering::SeqCst);

        let mut monitor = supervisor.spawn_health_monitor().unwrap();
        assert!(monitor.is_running());
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyRunning)));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(supervisor.spawned_total(), 2);

        monitor.stop().await.unwrap();
        assert!(!monitor.is_running());
    }
}
