//! Move entries to the system trash.
//!
//! # Overview
//!
//! For each selected entry, in order:
//!
//! 1. pause gate and cancellation check (a cancelled batch never moves
//!    another entry into `deleting`)
//! 2. TOCTOU check: the file's size and mtime must still match the registry
//! 3. `→ deleting`, then the volume's exclusive gate around the trash call
//! 4. `→ deleted` on success, `→ error` on failure
//!
//! A failed check in step 2 leaves the entry's state untouched.
//!
//! # Example
//!
//! ```no_run
//! use dupsweep::actions::delete::{Disposer, TrashDisposer};
//! use std::path::Path;
//!
//! TrashDisposer.dispose(Path::new("/path/to/duplicate.txt")).unwrap();
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use super::{BatchResult, Outcome};
use crate::control::RunContext;
use crate::limiter::ResourceLimiter;
use crate::registry::{FileEntry, FileState};

/// Error type for deletion operations.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when attempting to delete.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Size or mtime no longer match what the scan recorded.
    #[error("file modified since scan: {0}")]
    Modified(PathBuf),

    /// The entry is not in a deletable state.
    #[error("{path} is {state}, not deletable")]
    NotDeletable {
        /// Entry path.
        path: PathBuf,
        /// Its state at the time of the request.
        state: FileState,
    },

    /// Trash operation failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed {
        /// File that could not be trashed.
        path: PathBuf,
        /// Platform message.
        message: String,
    },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl DeleteError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Get the path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::Modified(p)
            | Self::NotDeletable { path: p, .. }
            | Self::TrashFailed { path: p, .. }
            | Self::Io { path: p, .. } => p,
        }
    }
}

/// Removes one file from disk.
pub trait Disposer: Send + Sync {
    /// Dispose of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeleteError`] if the file could not be removed.
    fn dispose(&self, path: &Path) -> Result<(), DeleteError>;
}

/// Moves files to the platform trash / recycle bin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrashDisposer;

impl Disposer for TrashDisposer {
    fn dispose(&self, path: &Path) -> Result<(), DeleteError> {
        trash::delete(path).map_err(|e| DeleteError::TrashFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Fail unless the file on disk still matches the entry's size and mtime.
///
/// # Errors
///
/// Returns [`DeleteError::Modified`] on a mismatch and an I/O classification
/// if the file can no longer be stat'ed.
pub fn verify_unchanged(entry: &FileEntry) -> Result<(), DeleteError> {
    let path = entry.path();
    let metadata = fs::metadata(path).map_err(|e| DeleteError::from_io(path, e))?;

    if metadata.len() != entry.size() {
        log::warn!(
            "File modified since scan: {} (size changed from {} to {})",
            path.display(),
            entry.size(),
            metadata.len()
        );
        return Err(DeleteError::Modified(path.to_path_buf()));
    }
    if let Ok(modified) = metadata.modified() {
        if modified != entry.modified() {
            log::warn!("File modified since scan: {} (mtime changed)", path.display());
            return Err(DeleteError::Modified(path.to_path_buf()));
        }
    }
    Ok(())
}

/// Delete one entry. Returns the bytes freed.
///
/// # Errors
///
/// Any [`DeleteError`]. The entry ends in `error` only if the disposer
/// itself failed; rejected entries keep their state.
pub fn delete_entry(
    entry: &FileEntry,
    disposer: &dyn Disposer,
    limiter: &ResourceLimiter,
) -> Result<u64, DeleteError> {
    let path = entry.path();
    let state = entry.state();
    if !state.can_transition_to(FileState::Deleting) {
        return Err(DeleteError::NotDeletable {
            path: path.to_path_buf(),
            state,
        });
    }
    verify_unchanged(entry)?;

    entry.begin_deleting().map_err(|e| DeleteError::NotDeletable {
        path: path.to_path_buf(),
        state: e.from,
    })?;

    let gates = limiter.volume(entry.volume());
    let disposed = {
        let _gate = gates.exclusive();
        disposer.dispose(path)
    };

    match disposed {
        Ok(()) => {
            // Only this thread moves an entry out of deleting.
            if let Err(e) = entry.finish_deleting() {
                log::error!("{e}");
            }
            log::info!("Moved to trash: {} ({} bytes)", path.display(), entry.size());
            Ok(entry.size())
        }
        Err(e) => {
            log::warn!("Delete failed for {}: {}", path.display(), e);
            if let Err(t) = entry.fail(e.to_string()) {
                log::error!("{t}");
            }
            Err(e)
        }
    }
}

/// Delete every entry in `entries`, soft-failing per file.
///
/// Entries not yet started when cancellation is observed are counted as
/// skipped and keep their state.
pub fn delete_entries(
    entries: &[Arc<FileEntry>],
    disposer: &dyn Disposer,
    limiter: &ResourceLimiter,
    run: &RunContext,
) -> BatchResult {
    let progress = run.progress();
    progress.begin_step(0, "delete");
    progress.set_total(entries.len() as u64);
    log::info!("Deleting {} files", entries.len());

    let outcomes: Vec<Outcome> = limiter.install(|| {
        entries
            .par_iter()
            .map(|entry| {
                if run.checkpoint().is_err() {
                    return Outcome::Skipped;
                }
                let outcome = match delete_entry(entry, disposer, limiter) {
                    Ok(bytes) => Outcome::Done(bytes),
                    Err(e) => Outcome::Failed(entry.path().to_path_buf(), e.to_string()),
                };
                progress.advance(1);
                outcome
            })
            .collect()
    });

    let result = BatchResult::from_outcomes(outcomes);
    log::info!("Delete finished: {}", result.summary());
    result
}
