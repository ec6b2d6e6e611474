//! Retry loop around a single operation

pub mod executor;
pub mod observer;

pub use executor::RetryExecutor;
pub use observer::{FnObserver, RecoveryObserver};
