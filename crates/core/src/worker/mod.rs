//! Supervised rendering workers
//!
//! - [`ports`]: the process and spawner traits plus wire types
//! - [`supervisor`]: pool, restart budget, per-call timeouts, liveness loop
//! - [`process`]: child-process implementation of the ports

pub mod ports;
pub mod process;
pub mod supervisor;

pub use ports::{WorkerFault, WorkerProcess, WorkerRequest, WorkerSpawner};
pub use process::{ProcessWorker, ProcessWorkerSpawner};
pub use supervisor::{
    MonitorError, SupervisorStatus, WorkerHandle, WorkerHealthMonitor, WorkerLease,
    WorkerStatus, WorkerSupervisor,
};
