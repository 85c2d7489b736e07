//! One discovered file and its lifecycle state.
//!
//! ```text
//!          ┌──────────────► unique ◄──────┐
//!          │                              │
//! idle ─► hashing ─► hashed ─► keep ─┐    │
//!  ▲         │  │          └─► delete┼────┘
//!  └─cancel──┘  └─► error            ▼
//!                     ▲   keep|delete|unique ─► deleting ─► deleted
//!                     └─────────────────────────────┘
//! ```
//!
//! `idle → unique` is taken when size partitioning alone proves a file
//! unique. Every transition runs under the entry's own lock; observers are
//! notified after the lock is released.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde::Serialize;

use super::Notifier;
use crate::limiter::VolumeId;

/// Lifecycle state of a [`FileEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// Discovered, not yet classified.
    Idle,
    /// Digest computation in progress.
    Hashing,
    /// Digest computed, awaiting group resolution.
    Hashed,
    /// The copy of a duplicate group that stays.
    Keep,
    /// A redundant copy in a duplicate group.
    Delete,
    /// No other file has the same content.
    Unique,
    /// Being moved to the trash.
    Deleting,
    /// Moved to the trash.
    Deleted,
    /// Hashing or deletion failed.
    Error,
}

impl FileState {
    /// All states, in declaration order.
    pub const ALL: [FileState; 9] = [
        Self::Idle,
        Self::Hashing,
        Self::Hashed,
        Self::Keep,
        Self::Delete,
        Self::Unique,
        Self::Deleting,
        Self::Deleted,
        Self::Error,
    ];

    /// Whether `self → to` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, to: FileState) -> bool {
        use FileState::{Deleted, Deleting, Delete, Error, Hashed, Hashing, Idle, Keep, Unique};
        matches!(
            (self, to),
            (Idle, Hashing | Unique)
                | (Hashing, Hashed | Error | Idle)
                | (Hashed, Keep | Delete | Unique)
                | (Keep | Delete | Unique, Deleting)
                | (Deleting, Deleted | Error)
        )
    }

    /// States in which the entry carries a digest.
    #[must_use]
    pub fn carries_digest(self) -> bool {
        matches!(
            self,
            Self::Hashed | Self::Keep | Self::Delete | Self::Unique | Self::Deleting | Self::Deleted
        )
    }

    /// Final classification of a scan.
    #[must_use]
    pub fn is_classified(self) -> bool {
        matches!(self, Self::Keep | Self::Delete | Self::Unique | Self::Error)
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Hashing => "hashing",
            Self::Hashed => "hashed",
            Self::Keep => "keep",
            Self::Delete => "delete",
            Self::Unique => "unique",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An illegal state transition was requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to} for {path}")]
pub struct TransitionError {
    /// The entry's path.
    pub path: PathBuf,
    /// State at the time of the request.
    pub from: FileState,
    /// Requested state.
    pub to: FileState,
}

#[derive(Debug)]
struct EntryInner {
    state: FileState,
    digest: Option<String>,
    group: Option<u64>,
    error: Option<String>,
}

/// One discovered file.
///
/// Path, size, mtime and volume are fixed at creation. The state, digest,
/// group and error message change only through the transition methods.
#[derive(Debug)]
pub struct FileEntry {
    id: usize,
    path: PathBuf,
    size: u64,
    modified: SystemTime,
    volume: VolumeId,
    inner: Mutex<EntryInner>,
    notifier: Arc<Notifier>,
}

/// Serializable copy of a [`FileEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySnapshot {
    /// Registry-unique id.
    pub id: usize,
    /// Absolute path.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Volume the file lives on.
    pub volume: VolumeId,
    /// Current state.
    pub state: FileState,
    /// Hex digest, if computed.
    pub digest: Option<String>,
    /// Duplicate group id, if grouped.
    pub group: Option<u64>,
    /// Last failure message, if any.
    pub error: Option<String>,
}

impl FileEntry {
    pub(super) fn new(
        id: usize,
        path: PathBuf,
        size: u64,
        modified: SystemTime,
        volume: VolumeId,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            id,
            path,
            size,
            modified,
            volume,
            inner: Mutex::new(EntryInner {
                state: FileState::Idle,
                digest: None,
                group: None,
                error: None,
            }),
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registry-unique id.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Absolute path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last modification time at discovery.
    #[must_use]
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Volume the file lives on.
    #[must_use]
    pub fn volume(&self) -> &VolumeId {
        &self.volume
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> FileState {
        self.lock().state
    }

    /// Hex digest, if computed.
    #[must_use]
    pub fn digest(&self) -> Option<String> {
        self.lock().digest.clone()
    }

    /// Duplicate group id, if grouped.
    #[must_use]
    pub fn group(&self) -> Option<u64> {
        self.lock().group
    }

    /// Last failure message.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Copy every field under one lock acquisition.
    #[must_use]
    pub fn snapshot(&self) -> EntrySnapshot {
        let inner = self.lock();
        EntrySnapshot {
            id: self.id,
            path: self.path.clone(),
            size: self.size,
            modified: self.modified,
            volume: self.volume.clone(),
            state: inner.state,
            digest: inner.digest.clone(),
            group: inner.group,
            error: inner.error.clone(),
        }
    }

    /// Apply `to` if legal, running `update` under the same lock.
    fn transition<F>(&self, to: FileState, update: F) -> Result<FileState, TransitionError>
    where
        F: FnOnce(&mut EntryInner),
    {
        let mut inner = self.lock();
        let from = inner.state;
        if !from.can_transition_to(to) {
            return Err(TransitionError {
                path: self.path.clone(),
                from,
                to,
            });
        }
        inner.state = to;
        update(&mut inner);
        drop(inner);

        log::trace!("{}: {} -> {}", self.path.display(), from, to);
        self.notifier.state_changed(self, from, to);
        Ok(from)
    }

    /// `idle → hashing`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] from any other state.
    pub fn begin_hashing(&self) -> Result<(), TransitionError> {
        self.transition(FileState::Hashing, |_| {}).map(drop)
    }

    /// `hashing → hashed`, recording the digest.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless hashing.
    pub fn finish_hashing(&self, digest: String) -> Result<(), TransitionError> {
        self.transition(FileState::Hashed, |inner| {
            inner.digest = Some(digest);
            inner.error = None;
        })
        .map(drop)
    }

    /// `hashing → idle` after cancellation mid-hash.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless hashing.
    pub fn revert_to_idle(&self) -> Result<(), TransitionError> {
        self.transition(FileState::Idle, |inner| inner.digest = None)
            .map(drop)
    }

    /// `hashing|deleting → error`, recording the message and dropping the digest.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] from any other state.
    pub fn fail(&self, message: impl Into<String>) -> Result<(), TransitionError> {
        let message = message.into();
        self.transition(FileState::Error, |inner| {
            inner.digest = None;
            inner.error = Some(message);
        })
        .map(drop)
    }

    /// `idle|hashed → unique`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] from any other state.
    pub fn mark_unique(&self) -> Result<(), TransitionError> {
        self.transition(FileState::Unique, |_| {}).map(drop)
    }

    /// `hashed → keep|delete`, recording the group id.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless hashed.
    pub fn assign_group(&self, group: u64, keep: bool) -> Result<(), TransitionError> {
        let to = if keep { FileState::Keep } else { FileState::Delete };
        self.transition(to, |inner| inner.group = Some(group))
            .map(drop)
    }

    /// `keep|delete|unique → deleting`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] from any other state.
    pub fn begin_deleting(&self) -> Result<(), TransitionError> {
        self.transition(FileState::Deleting, |_| {}).map(drop)
    }

    /// `deleting → deleted`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless deleting.
    pub fn finish_deleting(&self) -> Result<(), TransitionError> {
        self.transition(FileState::Deleted, |_| {}).map(drop)
    }
}
