//! Per-class service health
//!
//! Each operation class owns a circuit breaker and a set of health counters.
//! Classes never share locks, so a failing conversion service cannot slow
//! down page fetches.

pub mod tracker;

pub use tracker::{ServiceHealth, ServiceHealthTracker};
