//! Batch file actions run under the operation controller.
//!
//! - [`delete`]: move entries to the system trash, with a size/mtime
//!   re-check before each file
//! - [`copy`]: copy entries under a destination, keeping their position
//!   relative to the root they were found under
//!
//! Both actions are per-file soft-fail: a file that cannot be processed is
//! counted in the [`BatchResult`] and the batch carries on.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dupsweep::actions::delete::{delete_entries, TrashDisposer};
//! use dupsweep::control::{OperationKind, RunContext};
//! use dupsweep::limiter::{LimiterConfig, ResourceLimiter};
//! use dupsweep::registry::{FileRegistry, FileState};
//!
//! let registry = FileRegistry::new();
//! let limiter = ResourceLimiter::new(LimiterConfig::default()).unwrap();
//! let run = RunContext::detached(OperationKind::Delete, 1);
//! let doomed = registry.in_state(FileState::Delete);
//! let result = delete_entries(&doomed, &TrashDisposer, &limiter, &run);
//! println!("{}", result.summary());
//! ```

pub mod copy;
pub mod delete;

use std::path::PathBuf;

use bytesize::ByteSize;
use serde::Serialize;

/// Outcome of one file inside a batch.
#[derive(Debug)]
pub(crate) enum Outcome {
    Done(u64),
    Failed(PathBuf, String),
    Skipped,
}

/// Results of a batch delete or copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Files processed successfully.
    pub succeeded: usize,
    /// Files that failed, with the reason.
    pub failures: Vec<(PathBuf, String)>,
    /// Files never attempted because the batch was cancelled.
    pub skipped: usize,
    /// Bytes freed or copied.
    pub bytes: u64,
}

impl BatchResult {
    pub(crate) fn from_outcomes(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let mut result = Self::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Done(bytes) => {
                    result.succeeded += 1;
                    result.bytes = result.bytes.saturating_add(bytes);
                }
                Outcome::Failed(path, reason) => result.failures.push((path, reason)),
                Outcome::Skipped => result.skipped += 1,
            }
        }
        result.failures.sort();
        result
    }

    /// Number of failed files.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Number of files attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    /// Whether every attempted file succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} file(s), {}",
            self.succeeded,
            ByteSize::b(self.bytes)
        );
        if !self.all_succeeded() {
            line.push_str(&format!(", {} failed", self.failure_count()));
        }
        if self.skipped > 0 {
            line.push_str(&format!(", {} skipped", self.skipped));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_outcomes() {
        let result = BatchResult::from_outcomes([
            Outcome::Done(10),
            Outcome::Failed(PathBuf::from("/b"), "gone".into()),
            Outcome::Done(5),
            Outcome::Skipped,
        ]);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.bytes, 15);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.attempted(), 3);
        assert!(!result.all_succeeded());
        assert!(result.summary().contains("1 failed"));
        assert!(result.summary().contains("1 skipped"));
    }

    #[test]
    fn test_empty_summary() {
        let result = BatchResult::default();
        assert!(result.all_succeeded());
        assert!(result.summary().starts_with("0 file(s)"));
    }
}
