//! Run control shared by every long-running operation.
//!
//! This module provides:
//! - [`OperationState`]: the process-wide run state machine
//! - [`RunSignals`]: the cooperative pause gate and cancellation signal
//! - [`ProgressTracker`]: step-based progress and ETA
//! - [`OperationController`]: ties the three together and hands a
//!   [`RunContext`] to the operation it starts
//!
//! # Example
//!
//! ```
//! use dupsweep::control::{OperationController, OperationKind, OperationState, RunResult};
//!
//! let controller = OperationController::new();
//! let run = controller.begin(OperationKind::Scan, 4).unwrap();
//! assert_eq!(controller.state(), OperationState::Running);
//!
//! // Workers call `run.checkpoint()?` between units of I/O.
//! assert!(run.checkpoint().is_ok());
//!
//! controller.finish(RunResult::Completed);
//! assert_eq!(controller.state(), OperationState::Completed);
//! ```

pub mod controller;
pub mod gate;
pub mod progress;
pub mod state;

pub use controller::{ControlError, OperationController, RunContext, RunResult};
pub use gate::{Cancelled, RunSignals};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use state::{OperationKind, OperationState};
