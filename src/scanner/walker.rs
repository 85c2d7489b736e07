//! Directory enumeration using jwalk.
//!
//! Children of every directory are sorted by name before they are yielded,
//! so one enumeration call produces a stable order. Unreadable entries are
//! logged and collected as [`ScanError`]s rather than aborting the walk.
//! Hard links and followed symlinks that lead to an already enumerated file
//! are dropped; see [`identity`](super::identity).
//!
//! The walk observes the run's pause gate in two places: the jwalk workers
//! block in `process_read_dir` before listing a directory, and the consuming
//! thread checkpoints before every entry. On cancellation the workers stop
//! descending and the consumer returns [`Cancelled`].

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::{Parallelism, WalkDir};

use super::identity::{FileId, IdentityTracker};
use super::{FileRecord, ScanError, WalkerConfig};
use crate::control::{Cancelled, RunSignals};

/// Output of one enumeration: files found plus swallowed failures.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Files in walk order, one path per on-disk file.
    pub records: Vec<FileRecord>,
    /// Entries that could not be read.
    pub errors: Vec<ScanError>,
    /// Hard links and followed symlinks dropped because another path
    /// already names the same file.
    pub aliases: usize,
}

/// A file seen by the walk, before aliases are resolved.
struct Found {
    record: FileRecord,
    id: Option<FileId>,
    via_link: bool,
}

/// Directory walker for file discovery.
#[derive(Debug, Clone, Default)]
pub struct Walker {
    config: WalkerConfig,
    threads: usize,
}

impl Walker {
    /// Create a walker with the given filters.
    #[must_use]
    pub fn new(config: WalkerConfig) -> Self {
        Self { config, threads: 0 }
    }

    /// Number of directory-reading threads. `0` uses one per core,
    /// `1` walks on the calling thread.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Active filters.
    #[must_use]
    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    fn build_ignore(&self, root: &Path) -> Option<Arc<Gitignore>> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }
        let mut builder = GitignoreBuilder::new(root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }
        match builder.build() {
            Ok(gitignore) if !gitignore.is_empty() => Some(Arc::new(gitignore)),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Enumerate every file under every root, in root order.
    ///
    /// When several paths lead to one file (hard links, or a symlink and its
    /// target under `follow_symlinks`), only one is kept: a real path beats a
    /// symlink, then the first in walk order wins. This holds across roots.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if cancellation is observed mid-walk.
    pub fn enumerate(
        &self,
        roots: &[PathBuf],
        signals: &Arc<RunSignals>,
    ) -> Result<Enumeration, Cancelled> {
        let mut found = Vec::new();
        let mut out = Enumeration::default();
        for root in roots {
            self.walk_root(root, signals, &mut found, &mut out.errors)?;
        }

        let mut tracker = IdentityTracker::with_capacity(found.len());
        let mut keep = vec![false; found.len()];
        for pass_links in [false, true] {
            for (slot, file) in keep.iter_mut().zip(&found) {
                if file.via_link == pass_links {
                    *slot = tracker.claim(file.id);
                }
            }
        }
        for (file, kept) in found.into_iter().zip(keep) {
            if kept {
                out.records.push(file.record);
            } else {
                log::debug!("Skipping alias of an enumerated file: {}", file.record.path.display());
                out.aliases += 1;
            }
        }

        log::debug!(
            "Enumerated {} files under {} roots ({} aliases, {} errors)",
            out.records.len(),
            roots.len(),
            out.aliases,
            out.errors.len()
        );
        Ok(out)
    }

    fn walk_root(
        &self,
        root: &Path,
        signals: &Arc<RunSignals>,
        found: &mut Vec<Found>,
        errors: &mut Vec<ScanError>,
    ) -> Result<(), Cancelled> {
        signals.checkpoint()?;

        match std::fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                log::warn!("Not a directory: {}", root.display());
                errors.push(ScanError::NotADirectory(root.to_path_buf()));
                return Ok(());
            }
            Err(e) => {
                log::warn!("Cannot read root {}: {}", root.display(), e);
                errors.push(ScanError::from_io(root.to_path_buf(), e));
                return Ok(());
            }
        }

        let ignore = self.build_ignore(root);
        let gate = Arc::clone(signals);
        let parallelism = match self.threads {
            1 => Parallelism::Serial,
            n => Parallelism::RayonNewPool(n),
        };

        let walk_dir = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .parallelism(parallelism)
            .process_read_dir(move |_depth, _path, _state, children| {
                gate.wait_while_paused();
                if gate.is_cancelled() {
                    children.clear();
                    return;
                }
                if let Some(ignore) = &ignore {
                    children.retain(|child| match child {
                        Ok(entry) => {
                            let path = entry.path();
                            !ignore
                                .matched(&path, entry.file_type().is_dir())
                                .is_ignore()
                        }
                        Err(_) => true,
                    });
                }
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        for entry in walk_dir {
            signals.checkpoint()?;

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    errors.push(match e.into_io_error() {
                        Some(io) => ScanError::from_io(path, io),
                        None => ScanError::Io {
                            path,
                            source: std::io::Error::other("filesystem loop"),
                        },
                    });
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            let via_link = entry.path_is_symlink();
            if via_link && !self.config.follow_symlinks {
                log::trace!("Skipping symlink: {}", entry.path().display());
                continue;
            }

            let path = entry.path();
            let metadata = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Cannot stat {}: {}", path.display(), e);
                    errors.push(ScanError::from_io(path, e));
                    continue;
                }
            };

            let id = FileId::of(&path, &metadata);
            if let Some(record) = self.accept(path, &metadata) {
                found.push(Found { record, id, via_link });
            }
        }
        Ok(())
    }

    fn accept(&self, path: PathBuf, metadata: &Metadata) -> Option<FileRecord> {
        if !metadata.is_file() {
            return None;
        }
        if is_system(metadata) || (self.config.skip_hidden && is_hidden_attr(metadata)) {
            log::trace!("Skipping system/hidden file: {}", path.display());
            return None;
        }
        let size = metadata.len();
        if !self.config.accepts_size(size) {
            log::trace!("Skipping file due to size filter ({}): {}", size, path.display());
            return None;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Some(FileRecord::new(path, size, modified))
    }
}

#[cfg(windows)]
fn is_system(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    metadata.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0
}

#[cfg(not(windows))]
fn is_system(_metadata: &Metadata) -> bool {
    false
}

#[cfg(windows)]
fn is_hidden_attr(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(windows))]
fn is_hidden_attr(_metadata: &Metadata) -> bool {
    false
}
