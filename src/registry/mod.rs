//! The authoritative collection of discovered files.
//!
//! Entries are appended during enumeration and never removed individually;
//! a new scan replaces the whole registry. Every state change bumps a
//! generation counter and fans out to registered [`StateObserver`]s, which
//! lets consumers such as [`StatisticsCache`] recompute lazily.

pub mod entry;
pub mod stats;

use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

pub use entry::{EntrySnapshot, FileEntry, FileState, TransitionError};
pub use stats::{Bucket, Statistics, StatisticsCache};

use crate::limiter::VolumeId;
use crate::scanner::FileRecord;

/// Receives registry events. Called synchronously on the mutating thread,
/// after the entry's lock has been released.
pub trait StateObserver: Send + Sync {
    /// An entry moved from `from` to `to`.
    fn state_changed(&self, entry: &FileEntry, from: FileState, to: FileState);

    /// A new entry was inserted.
    fn entry_added(&self, _entry: &FileEntry) {}
}

/// Shared by the registry and its entries: the generation counter plus the
/// observer list.
#[derive(Default)]
pub(crate) struct Notifier {
    generation: AtomicU64,
    observers: RwLock<Vec<Arc<dyn StateObserver>>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Notifier {
    fn observers(&self) -> Vec<Arc<dyn StateObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn state_changed(&self, entry: &FileEntry, from: FileState, to: FileState) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        for observer in self.observers() {
            observer.state_changed(entry, from, to);
        }
    }

    fn entry_added(&self, entry: &FileEntry) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        for observer in self.observers() {
            observer.entry_added(entry);
        }
    }
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// Thread-safe, append-only collection of [`FileEntry`]s.
#[derive(Debug)]
pub struct FileRegistry {
    instance: u64,
    entries: RwLock<Vec<Arc<FileEntry>>>,
    notifier: Arc<Notifier>,
    next_id: AtomicUsize,
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FileRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            entries: RwLock::new(Vec::new()),
            notifier: Arc::new(Notifier::default()),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Process-unique id of this registry.
    #[must_use]
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Materialize `record` as an `idle` entry.
    pub fn insert(&self, record: FileRecord, volume: VolumeId) -> Arc<FileEntry> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(FileEntry::new(
            id,
            record.path,
            record.size,
            record.modified,
            volume,
            Arc::clone(&self.notifier),
        ));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&entry));
        self.notifier.entry_added(&entry);
        entry
    }

    /// Register an observer for future events.
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) {
        self.notifier
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Monotonic counter bumped on every insert and state change.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.notifier.generation.load(Ordering::Acquire)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<FileEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries currently in `state`.
    #[must_use]
    pub fn in_state(&self, state: FileState) -> Vec<Arc<FileEntry>> {
        self.entries()
            .into_iter()
            .filter(|e| e.state() == state)
            .collect()
    }

    /// Number of entries currently in `state`.
    #[must_use]
    pub fn count_in_state(&self, state: FileState) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.state() == state)
            .count()
    }

    /// Snapshots in display order: duplicate group ascending with ungrouped
    /// entries last, then size descending, then path ascending.
    #[must_use]
    pub fn sorted(&self) -> Vec<EntrySnapshot> {
        let mut snapshots: Vec<EntrySnapshot> =
            self.entries().iter().map(|e| e.snapshot()).collect();
        sort_snapshots(&mut snapshots);
        snapshots
    }

    /// Aggregate byte/file counts.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        Statistics::collect(self.entries().iter().map(|e| (e.state(), e.size())))
    }
}

/// Apply the display ordering used by [`FileRegistry::sorted`].
pub fn sort_snapshots(snapshots: &mut [EntrySnapshot]) {
    snapshots.sort_by(|a, b| {
        let key = |s: &EntrySnapshot| (s.group.is_none(), s.group, Reverse(s.size));
        key(a).cmp(&key(b)).then_with(|| a.path.cmp(&b.path))
    });
}
