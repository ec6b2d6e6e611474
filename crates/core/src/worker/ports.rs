//! Worker process ports and wire types

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docrecover_common::error::{FailureKind, FailureVariant, Fault};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Context key set on faults the worker pool raises about itself
pub const WORKER_POOL_CONTEXT_KEY: &str = "worker_pool";

/// Request sent to a rendering worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerRequest {
    /// Liveness check; a healthy worker answers immediately
    Ping,
    Render { document_id: String, page: u32, scale: f32 },
    /// Anything else the worker understands, passed through untouched
    Task { name: String, payload: serde_json::Value },
}

/// Failure talking to or managing a worker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerFault {
    #[error("worker crashed: {0}")]
    Crashed(String),

    #[error("worker protocol error: {0}")]
    Protocol(String),

    #[error("worker call timed out after {0:?}")]
    Timeout(Duration),

    /// The worker is fine but the requested work failed
    #[error("{0}")]
    Task(String),

    #[error("failed to start worker: {0}")]
    Spawn(String),

    #[error("worker restart budget exhausted after {restarts} restarts")]
    RestartBudgetExhausted { restarts: u32 },

    #[error("worker supervisor is shut down")]
    Shutdown,
}

impl WorkerFault {
    /// Whether the worker that produced this fault must be replaced
    pub fn poisons_worker(&self) -> bool {
        matches!(self, Self::Crashed(_) | Self::Protocol(_) | Self::Timeout(_))
    }

    /// Whether the supervisor refuses all further work
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RestartBudgetExhausted { .. } | Self::Shutdown)
    }
}

impl From<WorkerFault> for Fault {
    fn from(fault: WorkerFault) -> Self {
        let message = fault.to_string();
        match fault {
            WorkerFault::Crashed(_) | WorkerFault::Protocol(_) => {
                Fault::tagged(FailureKind::WorkerCrashed, message)
            }
            WorkerFault::Timeout(_) => Fault::tagged(FailureKind::NetworkTimeout, message)
                .with_variant(FailureVariant::OperationTimeout),
            // Task errors come from the document itself; let the classifier read them
            WorkerFault::Task(_) => Fault::new(message).with_name("WorkerTaskError"),
            WorkerFault::Spawn(_) => Fault::tagged(FailureKind::WorkerInitFailed, message),
            WorkerFault::RestartBudgetExhausted { restarts } => {
                Fault::tagged(FailureKind::WorkerInitFailed, message)
                    .with_context(WORKER_POOL_CONTEXT_KEY, format!("exhausted after {restarts} restarts"))
            }
            WorkerFault::Shutdown => Fault::tagged(FailureKind::WorkerInitFailed, message)
                .with_context(WORKER_POOL_CONTEXT_KEY, "shut down"),
        }
    }
}

/// One running worker
///
/// `call` takes `&self` so a timed-out call can keep running detached
/// while the supervisor moves on.
#[async_trait]
pub trait WorkerProcess: Send + Sync {
    fn id(&self) -> &str;

    async fn call(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerFault>;

    async fn ping(&self) -> Result<(), WorkerFault> {
        self.call(WorkerRequest::Ping).await.map(|_| ())
    }

    /// Stop the worker; must be safe to call more than once
    async fn terminate(&self);
}

/// Starts fresh workers
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, id: &str) -> Result<Arc<dyn WorkerProcess>, WorkerFault>;
}
