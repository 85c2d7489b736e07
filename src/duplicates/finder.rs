//! Duplicate finder: the four-stage scan pipeline.
//!
//! # Overview
//!
//! 1. **Enumerate**: walk every root and materialize one `idle` entry per
//!    file into the registry.
//! 2. **Partition**: files with a unique size are marked `unique` without
//!    being read.
//! 3. **Hash**: remaining candidates are grouped by volume and hashed with
//!    bounded concurrency per volume.
//! 4. **Resolve**: entries sharing a digest are optionally byte-compared,
//!    joined into duplicate groups, and marked `keep` or `delete`.
//!
//! Every stage honours the run's pause gate and cancellation signal. A
//! cancelled run leaves no entry in `hashing`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use dupsweep::control::{OperationKind, RunContext};
//! use dupsweep::duplicates::{DuplicateFinder, FinderConfig, SCAN_STEPS};
//! use dupsweep::limiter::{LimiterConfig, ResourceLimiter, VolumeMap};
//! use dupsweep::registry::FileRegistry;
//!
//! let limiter = Arc::new(ResourceLimiter::new(LimiterConfig::default()).unwrap());
//! let finder = DuplicateFinder::new(FinderConfig::default(), limiter, Arc::new(VolumeMap::detect()));
//! let registry = FileRegistry::new();
//! let run = RunContext::detached(OperationKind::Scan, SCAN_STEPS);
//!
//! let summary = finder.run(&[PathBuf::from(".")], &registry, &run).unwrap();
//! println!("{} groups, {} reclaimable", summary.duplicate_groups, summary.reclaimable_display());
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use rayon::prelude::*;
use serde::Serialize;

use super::groups::{
    group_by_digest, group_by_volume, partition_by_size, pick_keeper, resolve_clusters,
};
use crate::control::{Cancelled, RunContext};
use crate::limiter::{admit_pair, IoContext, ResourceLimiter, VolumeMap};
use crate::registry::{FileEntry, FileRegistry, FileState, TransitionError};
use crate::scanner::{
    ByteComparator, CompareError, HashAlgorithm, Hasher, Walker, WalkerConfig, DEFAULT_CHUNK_SIZE,
};

/// Number of progress steps a scan declares.
pub const SCAN_STEPS: u32 = 4;

/// Scan pipeline settings.
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// Digest used in the hash stage.
    pub algorithm: HashAlgorithm,
    /// Byte-compare every pair inside a hash group before grouping it.
    pub verify: bool,
    /// Read buffer size for hashing and comparison.
    pub chunk_size: usize,
    /// Enumeration filters.
    pub walker: WalkerConfig,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            verify: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            walker: WalkerConfig::default(),
        }
    }
}

impl FinderConfig {
    /// Set the digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Enable or disable byte-exact confirmation.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set the read buffer size. Clamped by the hasher.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the enumeration filters.
    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }
}

/// Fatal scan failures.
///
/// Per-file problems never show up here; they are recorded on the entry.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The run was cancelled.
    #[error("scan cancelled")]
    Cancelled(#[from] Cancelled),

    /// An entry refused a state change. Indicates a pipeline bug.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl FinderError {
    /// Whether this is a cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Counters collected over one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Files materialized into the registry.
    pub files_scanned: usize,
    /// Sum of their sizes.
    pub bytes_scanned: u64,
    /// Files and directories that could not be enumerated.
    pub scan_errors: usize,
    /// Extra paths to an already enumerated file (hard links, followed symlinks).
    pub aliases_skipped: usize,
    /// Files classified `unique` by size alone.
    pub unique_by_size: usize,
    /// Files fully hashed.
    pub hashed_files: usize,
    /// Files that failed to hash.
    pub hash_errors: usize,
    /// Byte comparisons performed.
    pub comparisons: usize,
    /// Pairs with equal digests but different contents.
    pub digest_collisions: usize,
    /// Duplicate groups formed.
    pub duplicate_groups: usize,
    /// Files marked `delete`.
    pub duplicate_files: usize,
    /// Bytes held by files marked `delete`.
    pub reclaimable_bytes: u64,
    /// Wall time of the scan.
    pub duration: Duration,
}

impl ScanSummary {
    /// Share of scanned bytes held by redundant copies, in percent.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.bytes_scanned == 0 {
            0.0
        } else {
            (self.reclaimable_bytes as f64 / self.bytes_scanned as f64) * 100.0
        }
    }

    /// Reclaimable bytes, human readable.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_bytes).to_string()
    }

    /// Scanned bytes, human readable.
    #[must_use]
    pub fn scanned_display(&self) -> String {
        ByteSize::b(self.bytes_scanned).to_string()
    }
}

#[derive(Debug, Default)]
struct Tally {
    hashed: AtomicUsize,
    failed: AtomicUsize,
    comparisons: AtomicUsize,
    collisions: AtomicUsize,
}

/// Drives the scan pipeline over a [`FileRegistry`].
#[derive(Debug, Clone)]
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Hasher,
    comparator: ByteComparator,
    limiter: Arc<ResourceLimiter>,
    volumes: Arc<VolumeMap>,
}

impl DuplicateFinder {
    /// Create a finder running its I/O inside `limiter`.
    #[must_use]
    pub fn new(config: FinderConfig, limiter: Arc<ResourceLimiter>, volumes: Arc<VolumeMap>) -> Self {
        let hasher = Hasher::new(config.algorithm).with_chunk_size(config.chunk_size);
        let comparator = ByteComparator::new(hasher.chunk_size());
        Self {
            config,
            hasher,
            comparator,
            limiter,
            volumes,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Scan `roots` into `registry` and classify every entry.
    ///
    /// `registry` should be empty; a new scan always gets a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Cancelled`] when the run is cancelled, and
    /// [`FinderError::Transition`] if an entry refuses a state change.
    pub fn run(
        &self,
        roots: &[PathBuf],
        registry: &FileRegistry,
        run: &RunContext,
    ) -> Result<ScanSummary, FinderError> {
        let started = Instant::now();
        let tally = Tally::default();
        let mut summary = ScanSummary::default();

        log::info!(
            "Scanning {} roots with {} (byte compare: {})",
            roots.len(),
            self.config.algorithm,
            self.config.verify
        );
        if self.config.algorithm.is_weak() && !self.config.verify {
            log::warn!(
                "{} is not collision resistant; pass --verify to confirm groups byte by byte",
                self.config.algorithm
            );
        }

        self.enumerate(roots, registry, run, &mut summary)?;
        let candidates = self.partition(registry, run, &mut summary)?;
        self.hash(candidates, run, &tally)?;
        self.resolve(registry, run, &tally, &mut summary)?;

        summary.hashed_files = tally.hashed.load(Ordering::Relaxed);
        summary.hash_errors = tally.failed.load(Ordering::Relaxed);
        summary.comparisons = tally.comparisons.load(Ordering::Relaxed);
        summary.digest_collisions = tally.collisions.load(Ordering::Relaxed);
        summary.duration = started.elapsed();
        run.progress().complete();

        log::info!(
            "Scan complete: {} files, {} groups, {} duplicates, {} reclaimable in {:.2?}",
            summary.files_scanned,
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display(),
            summary.duration
        );
        Ok(summary)
    }

    /// Stage 0: walk and materialize.
    fn enumerate(
        &self,
        roots: &[PathBuf],
        registry: &FileRegistry,
        run: &RunContext,
        summary: &mut ScanSummary,
    ) -> Result<(), FinderError> {
        let progress = run.progress();
        progress.begin_step(0, "enumerate");

        let walker = Walker::new(self.config.walker.clone()).with_threads(self.limiter.workers());
        let enumeration = walker.enumerate(roots, run.signals())?;
        summary.scan_errors = enumeration.errors.len();
        summary.aliases_skipped = enumeration.aliases;
        summary.files_scanned = enumeration.records.len();
        summary.bytes_scanned = enumeration.records.iter().map(|r| r.size).sum();
        progress.set_total(enumeration.records.len() as u64);

        self.limiter.install(|| {
            enumeration
                .records
                .into_par_iter()
                .try_for_each(|record| -> Result<(), Cancelled> {
                    run.checkpoint()?;
                    let volume = self.volumes.resolve(&record.path);
                    let entry = registry.insert(record, volume);
                    log::trace!("Found {} on {}", entry.path().display(), entry.volume());
                    progress.advance(1);
                    Ok(())
                })
        })?;

        log::info!(
            "Stage 0 complete: {} files ({}), {} unreadable, {} aliases skipped",
            summary.files_scanned,
            summary.scanned_display(),
            summary.scan_errors,
            summary.aliases_skipped
        );
        Ok(())
    }

    /// Stage 1: size partition. Returns the candidates left for hashing.
    fn partition(
        &self,
        registry: &FileRegistry,
        run: &RunContext,
        summary: &mut ScanSummary,
    ) -> Result<Vec<Arc<FileEntry>>, FinderError> {
        run.checkpoint()?;
        let progress = run.progress();
        progress.begin_step(1, "partition");

        let entries = registry.entries();
        progress.set_total(entries.len() as u64);
        let partition = partition_by_size(&entries);
        for entry in &partition.singletons {
            entry.mark_unique()?;
        }
        summary.unique_by_size = partition.singletons.len();
        progress.advance(entries.len() as u64);

        log::info!(
            "Stage 1 complete: {} unique by size ({:.1}% eliminated), {} candidates in {} size groups",
            partition.singletons.len(),
            partition.elimination_rate(),
            partition.candidates.len(),
            partition.candidate_sizes
        );
        Ok(partition.candidates)
    }

    /// Stage 2: hash candidates, volumes scheduled independently.
    ///
    /// Each volume gets `min(in_flight_cap, files)` lanes pulling from a
    /// shared cursor, so a slow volume never holds pool threads idle for
    /// another.
    fn hash(
        &self,
        candidates: Vec<Arc<FileEntry>>,
        run: &RunContext,
        tally: &Tally,
    ) -> Result<(), FinderError> {
        run.checkpoint()?;
        let progress = run.progress();
        progress.begin_step(2, "hash");
        progress.set_total(candidates.iter().map(|e| e.size()).sum());

        let by_volume = group_by_volume(candidates);
        let signals = run.signals().as_ref();
        let broken: Mutex<Option<TransitionError>> = Mutex::new(None);

        self.limiter.install(|| {
            rayon::scope(|scope| {
                for (volume, files) in &by_volume {
                    let gates = self.limiter.volume(volume);
                    let cursor = Arc::new(AtomicUsize::new(0));
                    let lanes = gates.capacity().min(files.len());
                    log::debug!("Hashing {} files on {} with {} lanes", files.len(), volume, lanes);

                    for _ in 0..lanes {
                        let gates = Arc::clone(&gates);
                        let cursor = Arc::clone(&cursor);
                        let broken = &broken;
                        scope.spawn(move |_| {
                            let io = IoContext::new(signals, &gates).with_progress(progress);
                            loop {
                                let index = cursor.fetch_add(1, Ordering::Relaxed);
                                let Some(entry) = files.get(index) else { break };
                                let _permit = gates.admit();
                                if let Err(e) = self.hash_entry(entry, &io, tally) {
                                    broken
                                        .lock()
                                        .unwrap_or_else(PoisonError::into_inner)
                                        .get_or_insert(e);
                                    break;
                                }
                            }
                        });
                    }
                }
            });
        });

        if let Some(e) = broken.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(e.into());
        }
        run.checkpoint()?;

        log::info!(
            "Stage 2 complete: {} hashed, {} failed",
            tally.hashed.load(Ordering::Relaxed),
            tally.failed.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn hash_entry(
        &self,
        entry: &FileEntry,
        io: &IoContext<'_>,
        tally: &Tally,
    ) -> Result<(), TransitionError> {
        if io.checkpoint().is_err() {
            return Ok(());
        }
        entry.begin_hashing()?;
        match self.hasher.hash_file_gated(entry.path(), io) {
            Ok(digest) => {
                log::trace!("{} {}", digest, entry.path().display());
                entry.finish_hashing(digest)?;
                tally.hashed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_cancelled() => entry.revert_to_idle()?,
            Err(e) => {
                log::warn!("Failed to hash {}: {}", entry.path().display(), e);
                entry.fail(e.to_string())?;
                tally.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Stage 3: turn hash groups into duplicate groups.
    fn resolve(
        &self,
        registry: &FileRegistry,
        run: &RunContext,
        tally: &Tally,
        summary: &mut ScanSummary,
    ) -> Result<(), FinderError> {
        run.checkpoint()?;
        let progress = run.progress();
        progress.begin_step(3, "resolve");

        let hash_groups = group_by_digest(&registry.in_state(FileState::Hashed));
        let hash_groups: Vec<_> = hash_groups.into_iter().collect();
        progress.set_total(hash_groups.len() as u64);

        let clusters: Vec<Vec<Vec<usize>>> = self.limiter.install(|| {
            hash_groups
                .par_iter()
                .map(|(_, members)| {
                    let clusters = self.cluster(members, run, tally);
                    progress.advance(1);
                    clusters
                })
                .collect::<Result<_, Cancelled>>()
        })?;

        // Ids follow (size, digest) order so repeated scans agree.
        let mut next_group: u64 = 0;
        for ((_, members), clusters) in hash_groups.iter().zip(clusters) {
            let mut grouped = vec![false; members.len()];
            for cluster in clusters {
                let cluster: Vec<Arc<FileEntry>> = cluster
                    .into_iter()
                    .map(|i| {
                        grouped[i] = true;
                        Arc::clone(&members[i])
                    })
                    .collect();
                let keeper = pick_keeper(&cluster).unwrap_or_default();
                let id = next_group;
                next_group += 1;

                for (i, entry) in cluster.iter().enumerate() {
                    entry.assign_group(id, i == keeper)?;
                }
                let redundant = cluster.len() - 1;
                summary.duplicate_groups += 1;
                summary.duplicate_files += redundant;
                summary.reclaimable_bytes += cluster[keeper].size() * redundant as u64;
                log::debug!(
                    "Group {}: keep {}, {} redundant",
                    id,
                    cluster[keeper].path().display(),
                    redundant
                );
            }
            for (entry, _) in members.iter().zip(&grouped).filter(|(_, g)| !**g) {
                entry.mark_unique()?;
            }
        }

        let leftovers = registry.in_state(FileState::Hashed);
        if !leftovers.is_empty() {
            log::debug!("Sweeping {} leftover hashed entries to unique", leftovers.len());
        }
        for entry in leftovers {
            entry.mark_unique()?;
        }

        log::info!(
            "Stage 3 complete: {} hash groups, {} duplicate groups",
            hash_groups.len(),
            summary.duplicate_groups
        );
        Ok(())
    }

    /// Proven-equal clusters within one hash group.
    fn cluster(
        &self,
        members: &[Arc<FileEntry>],
        run: &RunContext,
        tally: &Tally,
    ) -> Result<Vec<Vec<usize>>, Cancelled> {
        if members.len() < 2 {
            return Ok(Vec::new());
        }
        if !self.config.verify {
            return Ok(vec![(0..members.len()).collect()]);
        }

        let signals = run.signals().as_ref();
        resolve_clusters(members.len(), |i, j| {
            let (a, b) = (&members[i], &members[j]);
            let gates_a = self.limiter.volume(a.volume());
            let gates_b = self.limiter.volume(b.volume());
            let io_a = IoContext::new(signals, &gates_a);
            let io_b = IoContext::new(signals, &gates_b);
            let _permits = admit_pair(&gates_a, &gates_b);

            tally.comparisons.fetch_add(1, Ordering::Relaxed);
            match self.comparator.compare(a.path(), b.path(), &io_a, &io_b) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    tally.collisions.fetch_add(1, Ordering::Relaxed);
                    log::debug!(
                        "Digest match but contents differ: {} vs {}",
                        a.path().display(),
                        b.path().display()
                    );
                    Ok(false)
                }
                Err(CompareError::Cancelled) => Err(Cancelled),
                Err(e) => {
                    log::warn!("Treating pair as different: {}", e);
                    Ok(false)
                }
            }
        })
    }
}
