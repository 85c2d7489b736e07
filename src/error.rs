//! Process exit codes and machine-readable error reports.

use serde::Serialize;

/// Exit codes for the dupsweep binary.
///
/// - 0: scan finished and found duplicates, or an action fully succeeded
/// - 1: unexpected failure
/// - 2: scan finished and found no duplicates
/// - 3: finished, but some files could not be processed
/// - 130: cancelled (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Duplicates found, or every action succeeded.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Nothing to reclaim.
    NoDuplicates = 2,
    /// Completed with per-file failures.
    PartialSuccess = 3,
    /// Cancelled by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit status.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::NoDuplicates => "DS002",
            Self::PartialSuccess => "DS003",
            Self::Interrupted => "DS130",
        }
    }

    /// Exit code for a failed run, by inspecting the error chain.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let cancelled = err.chain().any(|cause| {
            cause
                .downcast_ref::<crate::duplicates::FinderError>()
                .is_some_and(crate::duplicates::FinderError::is_cancelled)
                || cause.downcast_ref::<crate::control::Cancelled>().is_some()
        });
        if cancelled {
            Self::Interrupted
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g. "DS001").
    pub code: String,
    /// The exit code number.
    pub exit_code: i32,
    /// Human-readable message including causes.
    pub message: String,
    /// Whether the operation was cancelled.
    pub interrupted: bool,
}

impl StructuredError {
    /// Build from an error and the exit code it maps to.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
