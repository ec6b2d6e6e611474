//! Testing utilities shared by the workspace's unit and integration tests
//!
//! - **[`assertions`]**: assertions for classified failures and delays
//! - **[`mocks`]**: scripted operations with invocation counters
//!
//! ```rust
//! use docrecover_common::error::{FailureKind, Fault};
//! use docrecover_common::testing::ScriptedOperation;
//!
//! let op = ScriptedOperation::new(vec![
//!     Err(Fault::tagged(FailureKind::NetworkTimeout, "timed out")),
//!     Ok(7),
//! ]);
//! assert!(op.next_result().is_err());
//! assert_eq!(op.next_result().unwrap(), 7);
//! assert_eq!(op.invocations(), 2);
//! ```

pub mod assertions;
pub mod mocks;

pub use assertions::{assert_delays, assert_duration_in_range};
pub use mocks::{RecordingObserver, ScriptedOperation};

pub use crate::resilience::clock::{Clock, MockClock, SystemClock};
