//! The set of root folders to scan.
//!
//! No root may equal, contain, or lie inside another. Comparison is
//! case-insensitive, Unicode-normalized and boundary-aware, so `/data/foo`
//! and `/data/foobar` can coexist while `/data/Foo/bar` and `/data/foo` cannot.
//!
//! Each root also carries per-state visibility flags used by the display
//! filter predicate [`FolderSet::is_visible`].

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::registry::{FileEntry, FileState};
use crate::scanner::path_utils::{is_within, normalize_lexically, paths_equal};

/// How a candidate root collides with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConflictKind {
    /// The same folder is already a root.
    Duplicate,
    /// The candidate lies inside an existing root.
    NestedInside,
    /// The candidate contains an existing root.
    ContainsExisting,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => f.write_str("is already added"),
            Self::NestedInside => f.write_str("is inside"),
            Self::ContainsExisting => f.write_str("contains"),
        }
    }
}

/// Errors from folder set mutations.
#[derive(Debug, thiserror::Error)]
pub enum FolderError {
    /// The candidate overlaps an existing root.
    #[error("{} {kind} {}", .path.display(), .existing.display())]
    Conflict {
        /// Rejected path.
        path: PathBuf,
        /// Root it collides with.
        existing: PathBuf,
        /// Kind of overlap.
        kind: ConflictKind,
    },

    /// The path could not be made absolute.
    #[error("invalid folder path {}: {reason}", .path.display())]
    InvalidPath {
        /// Rejected path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },
}

/// Which entry states a root shows in filtered views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Visibility {
    shown: [bool; FileState::ALL.len()],
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            shown: [true; FileState::ALL.len()],
        }
    }
}

impl Visibility {
    fn index(state: FileState) -> usize {
        FileState::ALL
            .iter()
            .position(|s| *s == state)
            .unwrap_or_default()
    }

    /// Whether entries in `state` are shown.
    #[must_use]
    pub fn shows(&self, state: FileState) -> bool {
        self.shown[Self::index(state)]
    }

    /// Show or hide entries in `state`.
    pub fn set(&mut self, state: FileState, visible: bool) {
        self.shown[Self::index(state)] = visible;
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, state: FileState, visible: bool) -> Self {
        self.set(state, visible);
        self
    }
}

/// One user-selected root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderRoot {
    path: PathBuf,
    visibility: Visibility,
}

impl FolderRoot {
    /// Absolute path of the root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display filter flags.
    #[must_use]
    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }
}

/// Absolute form of `path` with `.` and `..` folded away.
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    std::path::absolute(path).map(|p| normalize_lexically(&p))
}

/// Ordered set of non-overlapping roots.
#[derive(Debug, Clone, Default)]
pub struct FolderSet {
    roots: Vec<FolderRoot>,
    generation: u64,
}

impl FolderSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `path` as a new root.
    ///
    /// Relative paths are resolved against the current directory, and `.`
    /// and `..` components are folded away before the conflict check, so
    /// `/t/x/../a/sub` is seen as `/t/a/sub`.
    ///
    /// # Errors
    ///
    /// Returns [`FolderError::Conflict`] if `path` equals, lies inside, or
    /// contains an existing root, and [`FolderError::InvalidPath`] if it
    /// cannot be made absolute.
    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<&FolderRoot, FolderError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(FolderError::InvalidPath {
                path: path.to_path_buf(),
                reason: "empty path".to_string(),
            });
        }
        let path = resolve(path).map_err(|e| FolderError::InvalidPath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some((existing, kind)) = self.conflict(&path) {
            log::debug!("Rejected folder {}: {} {}", path.display(), kind, existing.display());
            return Err(FolderError::Conflict {
                path,
                existing: existing.to_path_buf(),
                kind,
            });
        }

        log::debug!("Added folder {}", path.display());
        self.roots.push(FolderRoot {
            path,
            visibility: Visibility::default(),
        });
        self.generation += 1;
        Ok(&self.roots[self.roots.len() - 1])
    }

    fn conflict(&self, candidate: &Path) -> Option<(&Path, ConflictKind)> {
        self.roots.iter().find_map(|root| {
            let existing = root.path.as_path();
            if paths_equal(candidate, existing) {
                Some((existing, ConflictKind::Duplicate))
            } else if is_within(candidate, existing) {
                Some((existing, ConflictKind::NestedInside))
            } else if is_within(existing, candidate) {
                Some((existing, ConflictKind::ContainsExisting))
            } else {
                None
            }
        })
    }

    /// Remove the root equal to `path`. Returns whether one was removed.
    ///
    /// Entries from earlier scans are untouched.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let path = resolve(path).unwrap_or_else(|_| normalize_lexically(path));
        let before = self.roots.len();
        self.roots.retain(|root| !paths_equal(&root.path, &path));
        let removed = self.roots.len() != before;
        if removed {
            self.generation += 1;
            log::debug!("Removed folder {}", path.display());
        }
        removed
    }

    /// Roots in insertion order.
    #[must_use]
    pub fn roots(&self) -> &[FolderRoot] {
        &self.roots
    }

    /// Root paths in insertion order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.roots.iter().map(|r| r.path.clone()).collect()
    }

    /// Number of roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Bumped on every successful mutation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The root `path` falls under, if any.
    #[must_use]
    pub fn root_for(&self, path: &Path) -> Option<&FolderRoot> {
        self.roots.iter().find(|root| is_within(path, &root.path))
    }

    /// Show or hide `state` under the root equal to `root`.
    /// Returns `false` if no such root exists.
    pub fn set_visibility(&mut self, root: &Path, state: FileState, visible: bool) -> bool {
        let root = resolve(root).unwrap_or_else(|_| normalize_lexically(root));
        let Some(found) = self.roots.iter_mut().find(|r| paths_equal(&r.path, &root)) else {
            return false;
        };
        if found.visibility.shows(state) != visible {
            found.visibility.set(state, visible);
            self.generation += 1;
        }
        true
    }

    /// Filter predicate: visible iff the path falls under a root whose flags
    /// show `state`. Paths under no root are hidden.
    #[must_use]
    pub fn is_visible(&self, path: &Path, state: FileState) -> bool {
        self.root_for(path)
            .is_some_and(|root| root.visibility.shows(state))
    }

    /// [`is_visible`](Self::is_visible) for a registry entry.
    #[must_use]
    pub fn shows_entry(&self, entry: &FileEntry) -> bool {
        self.is_visible(entry.path(), entry.state())
    }
}
