//! Operation run states.

use serde::Serialize;

/// Coarse state of the (single) running operation.
///
/// ```text
/// Idle/Completed/Cancelled/Error ──start──► Running ◄──resume── Paused
///                                            │  │  └──pause──►   │
///                                            │  └────cancel──► Cancelling ──► Cancelled
///                                            └──finish──► Completed
/// Running|Paused ──failure──► Error
/// Paused ──finish──► (resume) Running ──► Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationState {
    /// Nothing has run yet.
    Idle,
    /// An operation is making progress.
    Running,
    /// Workers are blocked on the pause gate.
    Paused,
    /// Cancellation was requested; workers are unwinding.
    Cancelling,
    /// The last operation unwound after a cancel request.
    Cancelled,
    /// The last operation finished normally.
    Completed,
    /// The last operation stopped on an unrecovered failure.
    Error,
}

impl OperationState {
    /// Whether a new operation may start from this state.
    #[must_use]
    pub fn can_start(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Completed | Self::Cancelled | Self::Error
        )
    }

    /// Terminal states only leave via a new `Running` transition.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    /// An operation owns the controller.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Cancelling)
    }

    /// Pause is only meaningful while running.
    #[must_use]
    pub fn can_pause(self) -> bool {
        self == Self::Running
    }

    /// Resume is only meaningful while paused.
    #[must_use]
    pub fn can_resume(self) -> bool {
        self == Self::Paused
    }

    /// Cancel applies to running and paused operations.
    #[must_use]
    pub fn can_cancel(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Which operation currently owns (or last owned) the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    /// Enumerate, partition, hash and compare.
    Scan,
    /// Move selected files to the trash.
    Delete,
    /// Copy selected files under a destination root.
    Copy,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => f.write_str("scan"),
            Self::Delete => f.write_str("delete"),
            Self::Copy => f.write_str("copy"),
        }
    }
}
