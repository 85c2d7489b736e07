//! Aggregate counts derived from the registry.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use super::{FileRegistry, FileState};

/// A file count plus a byte total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    /// Number of files.
    pub files: u64,
    /// Sum of their sizes.
    pub bytes: u64,
}

impl Bucket {
    fn add(&mut self, size: u64) {
        self.files += 1;
        self.bytes = self.bytes.saturating_add(size);
    }

    /// Share of `total` files, in percent. Zero when `total` is empty.
    #[must_use]
    pub fn files_percent_of(&self, total: &Bucket) -> f64 {
        percent(self.files, total.files)
    }

    /// Share of `total` bytes, in percent. Zero when `total` is empty.
    #[must_use]
    pub fn bytes_percent_of(&self, total: &Bucket) -> f64 {
        percent(self.bytes, total.bytes)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Per-bucket totals over every entry in a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Every entry.
    pub total: Bucket,
    /// Entries classified `unique`.
    pub unique: Bucket,
    /// Entries marked `keep`.
    pub keep: Bucket,
    /// Entries marked `delete`.
    pub delete: Bucket,
    /// Everything that would remain once `delete` entries are gone.
    pub remaining_after_delete: Bucket,
    /// Entries in `error`.
    pub errors: Bucket,
    /// Entries already moved to the trash.
    pub deleted: Bucket,
}

impl Statistics {
    /// Fold `(state, size)` pairs into buckets.
    pub fn collect<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (FileState, u64)>,
    {
        let mut stats = Self::default();
        for (state, size) in entries {
            stats.total.add(size);
            match state {
                FileState::Unique => stats.unique.add(size),
                FileState::Keep => stats.keep.add(size),
                FileState::Delete => stats.delete.add(size),
                FileState::Error => stats.errors.add(size),
                FileState::Deleted => stats.deleted.add(size),
                _ => {}
            }
            if !matches!(
                state,
                FileState::Delete | FileState::Deleting | FileState::Deleted
            ) {
                stats.remaining_after_delete.add(size);
            }
        }
        stats
    }
}

/// Caches [`Statistics`] until the registry's generation moves.
#[derive(Debug, Default)]
pub struct StatisticsCache {
    cached: Mutex<Option<(u64, u64, Statistics)>>,
}

impl StatisticsCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics for `registry`, recomputed only when it changed.
    ///
    /// The cache is keyed on the registry instance plus its generation, so
    /// swapping in a new registry also invalidates it.
    pub fn get(&self, registry: &FileRegistry) -> Statistics {
        let identity = registry.instance();
        let generation = registry.generation();
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((id, seen, stats)) = *cached {
            if id == identity && seen == generation {
                return stats;
            }
        }
        let stats = registry.statistics();
        *cached = Some((identity, generation, stats));
        stats
    }
}
