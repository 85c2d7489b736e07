//! Concurrency gates for file I/O.
//!
//! Three layers, outermost first:
//!
//! 1. **Global worker cap**: a dedicated rayon pool of `workers` threads runs
//!    every file-level unit of work.
//! 2. **Per-volume in-flight cap**: at most `per_volume_in_flight` files on
//!    one volume hold open read buffers at once.
//! 3. **Per-volume read gate**: a mutex held around each individual chunk
//!    read (never a whole file), so one volume sees at most one outstanding
//!    read regardless of how many files are being hashed on it.

pub mod budget;
pub mod volume;

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::control::{Cancelled, ProgressTracker, RunSignals};

pub use budget::{InFlightCap, InFlightPermit};
pub use volume::{VolumeId, VolumeMap};

/// Default number of files per volume that may be read concurrently.
pub const DEFAULT_PER_VOLUME_IN_FLIGHT: usize = 5;

/// Errors building a [`ResourceLimiter`].
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Limits applied to every I/O-bound step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Global worker cap. `0` means one per logical core.
    pub workers: usize,
    /// Files per volume with open read buffers at once.
    pub per_volume_in_flight: usize,
    /// Hold a per-volume mutex around each read and delete.
    pub serialize_reads: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            per_volume_in_flight: DEFAULT_PER_VOLUME_IN_FLIGHT,
            serialize_reads: true,
        }
    }
}

impl LimiterConfig {
    /// Set the global worker cap.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-volume in-flight cap.
    #[must_use]
    pub fn with_per_volume_in_flight(mut self, cap: usize) -> Self {
        self.per_volume_in_flight = cap.max(1);
        self
    }

    /// Enable or disable per-volume read serialization.
    #[must_use]
    pub fn with_serialize_reads(mut self, serialize: bool) -> Self {
        self.serialize_reads = serialize;
        self
    }

    fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.workers
        }
    }
}

/// Gates for a single volume.
#[derive(Debug)]
pub struct VolumeLimiter {
    id: VolumeId,
    in_flight: InFlightCap,
    reads: Option<Mutex<()>>,
}

impl VolumeLimiter {
    /// Create the gates for `id`.
    #[must_use]
    pub fn new(id: VolumeId, in_flight: usize, serialize_reads: bool) -> Self {
        Self {
            id,
            in_flight: InFlightCap::new(in_flight),
            reads: serialize_reads.then(|| Mutex::new(())),
        }
    }

    /// A limiter with no read serialization and no in-flight limit.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(VolumeId::Unknown, usize::MAX, false)
    }

    /// Volume this limiter guards.
    #[must_use]
    pub fn id(&self) -> &VolumeId {
        &self.id
    }

    /// In-flight capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.in_flight.total()
    }

    /// Block until this volume admits one more in-flight file.
    pub fn admit(&self) -> InFlightPermit<'_> {
        self.in_flight.acquire()
    }

    /// Files currently admitted.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.in_use()
    }

    /// Exclusive access to the volume for one read or delete.
    ///
    /// `None` when serialization is disabled.
    pub fn exclusive(&self) -> Option<MutexGuard<'_, ()>> {
        self.reads
            .as_ref()
            .map(|gate| gate.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Permits held while one pair of files is open together.
pub struct PairPermit<'a> {
    _first: InFlightPermit<'a>,
    _second: Option<InFlightPermit<'a>>,
}

/// Admit a pair of files, one on `a`'s volume and one on `b`'s.
///
/// Two files on the same volume take a single permit, so a cap of one can
/// never block itself. Across volumes, permits are taken in [`VolumeId`]
/// order so concurrent pairs cannot wait on each other in a cycle.
pub fn admit_pair<'a>(a: &'a VolumeLimiter, b: &'a VolumeLimiter) -> PairPermit<'a> {
    if a.id() == b.id() {
        return PairPermit {
            _first: a.admit(),
            _second: None,
        };
    }
    let (first, second) = if a.id() < b.id() { (a, b) } else { (b, a) };
    let first = first.admit();
    PairPermit {
        _first: first,
        _second: Some(second.admit()),
    }
}

/// Owns the worker pool and lazily creates one [`VolumeLimiter`] per volume.
pub struct ResourceLimiter {
    pool: rayon::ThreadPool,
    config: LimiterConfig,
    volumes: Mutex<HashMap<VolumeId, Arc<VolumeLimiter>>>,
}

impl std::fmt::Debug for ResourceLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLimiter")
            .field("workers", &self.pool.current_num_threads())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResourceLimiter {
    /// Build the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Pool`] if rayon cannot spawn its threads.
    pub fn new(config: LimiterConfig) -> Result<Self, LimiterError> {
        let workers = config.effective_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("dupsweep-worker-{i}"))
            .build()?;
        log::debug!(
            "Resource limiter: {workers} workers, {} in flight per volume, serialized reads: {}",
            config.per_volume_in_flight,
            config.serialize_reads
        );
        Ok(Self {
            pool,
            config,
            volumes: Mutex::new(HashMap::new()),
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Run `op` inside the worker pool.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// The limiter for `id`, created on first use.
    pub fn volume(&self, id: &VolumeId) -> Arc<VolumeLimiter> {
        let mut volumes = self.volumes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(volumes.entry(id.clone()).or_insert_with(|| {
            Arc::new(VolumeLimiter::new(
                id.clone(),
                self.config.per_volume_in_flight,
                self.config.serialize_reads,
            ))
        }))
    }
}

/// Everything a worker needs to perform gated, interruptible reads.
#[derive(Clone, Copy)]
pub struct IoContext<'a> {
    signals: &'a RunSignals,
    volume: &'a VolumeLimiter,
    progress: Option<&'a ProgressTracker>,
}

impl<'a> IoContext<'a> {
    /// Bundle the run signals with a volume's gates.
    #[must_use]
    pub fn new(signals: &'a RunSignals, volume: &'a VolumeLimiter) -> Self {
        Self {
            signals,
            volume,
            progress: None,
        }
    }

    /// Advance `progress` by the number of bytes read.
    #[must_use]
    pub fn with_progress(mut self, progress: &'a ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Pause gate then cancellation check.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] after cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        self.signals.checkpoint()
    }

    /// The volume gates in use.
    #[must_use]
    pub fn volume(&self) -> &VolumeLimiter {
        self.volume
    }

    /// Fill `buf` from `reader` while holding the volume's read gate.
    ///
    /// Returns fewer bytes than `buf.len()` only at end of file.
    ///
    /// # Errors
    ///
    /// Propagates any read error other than `Interrupted`.
    pub fn read_chunk<R: Read>(&self, reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
        let _gate = self.volume.exclusive();
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        if let Some(progress) = self.progress {
            progress.advance(filled as u64);
        }
        Ok(filled)
    }
}
