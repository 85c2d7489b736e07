//! Directory enumeration, content hashing and byte comparison.
//!
//! - [`walker`]: sorted, pausable directory traversal using jwalk
//! - [`hasher`]: chunked streaming digests (CRC32, MD5, SHA-256, SHA-512, BLAKE3)
//! - [`compare`]: byte-exact comparison of two same-size files
//! - [`identity`]: hard link and symlink aliases of one on-disk file
//! - [`path_utils`]: Unicode/case-insensitive path keys and containment
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use dupsweep::control::RunSignals;
//! use dupsweep::scanner::{Walker, WalkerConfig};
//!
//! let walker = Walker::new(WalkerConfig::default().with_skip_hidden(true));
//! let signals = Arc::new(RunSignals::new());
//! let found = walker.enumerate(&[PathBuf::from(".")], &signals).unwrap();
//! for record in &found.records {
//!     println!("{}: {} bytes", record.path.display(), record.size);
//! }
//! ```

pub mod compare;
pub mod hasher;
pub mod identity;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;
use std::time::SystemTime;

pub use compare::{ByteComparator, CompareError};
pub use hasher::{HashAlgorithm, Hasher, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use identity::{FileId, IdentityTracker};
pub use walker::{Enumeration, Walker};

/// One file found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl FileRecord {
    /// Create a record.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// Filters applied during enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Follow symbolic links. Symlinks are skipped otherwise.
    pub follow_symlinks: bool,
    /// Skip dot-files and (on Windows) files with the hidden attribute.
    pub skip_hidden: bool,
    /// Skip zero-byte files.
    pub skip_empty: bool,
    /// Minimum file size to include.
    pub min_size: Option<u64>,
    /// Maximum file size to include.
    pub max_size: Option<u64>,
    /// Gitignore-style patterns to exclude.
    pub ignore_patterns: Vec<String>,
}

impl WalkerConfig {
    /// Follow symbolic links.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Skip hidden files and directories.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Skip zero-byte files.
    #[must_use]
    pub fn with_skip_empty(mut self, skip: bool) -> Self {
        self.skip_empty = skip;
        self
    }

    /// Only include files of at least `size` bytes.
    #[must_use]
    pub fn with_min_size(mut self, size: Option<u64>) -> Self {
        self.min_size = size;
        self
    }

    /// Only include files of at most `size` bytes.
    #[must_use]
    pub fn with_max_size(mut self, size: Option<u64>) -> Self {
        self.max_size = size;
        self
    }

    /// Exclude paths matching any of `patterns`.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Whether `size` passes the min/max filters.
    #[must_use]
    pub fn accepts_size(&self, size: u64) -> bool {
        if self.skip_empty && size == 0 {
            return false;
        }
        self.min_size.map_or(true, |min| size >= min) && self.max_size.map_or(true, |max| size <= max)
    }
}

/// Per-item failures during enumeration. Logged and counted, never fatal.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path vanished or never existed.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A root is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Any other I/O failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: PathBuf, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Io {
                path,
                source: error,
            },
        }
    }
}

/// Per-file hashing failures.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The file vanished before or during hashing.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Cancellation was observed between chunks.
    #[error("hashing cancelled: {0}")]
    Cancelled(PathBuf),
}

impl HashError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: PathBuf, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Io {
                path,
                source: error,
            },
        }
    }

    /// Whether this is a cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
