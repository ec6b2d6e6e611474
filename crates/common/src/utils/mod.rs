//! Common utility functions and helper macros
//!
//! - **[`macros`]**: declarative macros for string-backed enums
//! - **[`serde`]**: serialization helpers for durations

#[macro_use]
pub mod macros;
pub mod serde;

pub use self::serde::duration_millis;
