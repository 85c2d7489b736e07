//! On-disk file identity.
//!
//! Two paths name the same file when they are hard links to one inode, or
//! when one of them is a symlink resolved by a followed walk. Such aliases
//! share content but deleting one frees nothing, and trashing the target of
//! a kept symlink leaves the link dangling. Enumeration therefore keeps one
//! path per identity.
//!
//! - **Unix**: `(st_dev, st_ino)` from the metadata
//! - **Windows**: volume serial number and file index, read from an open handle
//! - **Other**: no identity; every path counts as its own file

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::Path;

/// Identity of the file behind a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    volume: u64,
    index: u64,
}

impl FileId {
    /// Identity of the file at `path`, whose followed metadata is `metadata`.
    ///
    /// `None` when the platform exposes no identity or the file cannot be
    /// opened to read one.
    #[cfg(unix)]
    #[must_use]
    pub fn of(_path: &Path, metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            volume: metadata.dev(),
            index: metadata.ino(),
        })
    }

    #[cfg(windows)]
    #[must_use]
    pub fn of(path: &Path, _metadata: &Metadata) -> Option<Self> {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::{GetFileInformationByHandle, BY_HANDLE_FILE_INFORMATION};

        let file = std::fs::File::open(path).ok()?;
        // SAFETY: the handle stays open for the duration of the call and
        // `info` is a plain C struct the call fills in.
        let info = unsafe {
            let mut info: BY_HANDLE_FILE_INFORMATION = std::mem::zeroed();
            if GetFileInformationByHandle(file.as_raw_handle().cast(), &mut info) == 0 {
                return None;
            }
            info
        };
        Some(Self {
            volume: u64::from(info.dwVolumeSerialNumber),
            index: (u64::from(info.nFileIndexHigh) << 32) | u64::from(info.nFileIndexLow),
        })
    }

    #[cfg(not(any(unix, windows)))]
    #[must_use]
    pub fn of(_path: &Path, _metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Remembers identities already claimed by an enumerated path.
#[derive(Debug, Default)]
pub struct IdentityTracker {
    seen: HashSet<FileId>,
}

impl IdentityTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker sized for `capacity` files.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Claim `id`. Returns `false` if another path already holds it.
    /// Files without an identity are always accepted.
    pub fn claim(&mut self, id: Option<FileId>) -> bool {
        id.map_or(true, |id| self.seen.insert(id))
    }

    /// Number of distinct identities claimed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Whether hard links and followed symlinks can be recognized here.
    #[must_use]
    pub const fn is_supported() -> bool {
        cfg!(any(unix, windows))
    }
}
