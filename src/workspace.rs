//! The command/query facade over the whole core.
//!
//! A [`Workspace`] owns the folder set, the current registry, the operation
//! controller and the resource limiter. Long-running commands return as soon
//! as their background thread is started; progress and outcome are observed
//! through the query methods, or by blocking in [`Workspace::wait`].
//!
//! # Example
//!
//! ```no_run
//! use dupsweep::workspace::{Workspace, WorkspaceConfig};
//!
//! let workspace = Workspace::new(WorkspaceConfig::default()).unwrap();
//! workspace.add_folder("/data/photos").unwrap();
//! workspace.start_scan().unwrap();
//! let report = workspace.wait().unwrap();
//! println!("{:?}: {} groups", report.outcome, report.scan.map_or(0, |s| s.duplicate_groups));
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::actions::copy::copy_entries;
use crate::actions::delete::{delete_entries, Disposer, TrashDisposer};
use crate::actions::BatchResult;
use crate::control::{
    ControlError, OperationController, OperationKind, OperationState, ProgressSnapshot, RunContext,
    RunResult,
};
use crate::duplicates::{
    registry_groups, DuplicateFinder, DuplicateGroup, FinderConfig, ScanSummary, SCAN_STEPS,
};
use crate::folders::{FolderError, FolderRoot, FolderSet};
use crate::limiter::{LimiterConfig, LimiterError, ResourceLimiter, VolumeMap};
use crate::registry::{
    sort_snapshots, EntrySnapshot, FileEntry, FileRegistry, FileState, StateObserver, Statistics,
    StatisticsCache,
};

/// Errors from workspace commands.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Another operation is active.
    #[error(transparent)]
    Busy(#[from] ControlError),

    /// A folder could not be added.
    #[error(transparent)]
    Folder(#[from] FolderError),

    /// The worker pool could not be built.
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    /// The background thread could not be started.
    #[error("failed to start background operation: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Settings for a [`Workspace`].
#[derive(Debug, Clone, Default)]
pub struct WorkspaceConfig {
    /// Scan pipeline settings.
    pub finder: FinderConfig,
    /// Concurrency limits.
    pub limiter: LimiterConfig,
}

/// What happened in the most recent operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Operation that ran.
    pub kind: OperationKind,
    /// Final controller state.
    pub outcome: OperationState,
    /// Scan counters, for completed scans.
    pub scan: Option<ScanSummary>,
    /// Per-file results, for delete and copy.
    pub batch: Option<BatchResult>,
    /// Failure message, for runs ending in `error`.
    pub error: Option<String>,
    /// Wall time.
    pub duration: Duration,
}

impl RunSummary {
    /// Items that failed without aborting the run.
    #[must_use]
    pub fn failed_items(&self) -> usize {
        let scan = self
            .scan
            .as_ref()
            .map_or(0, |s| s.scan_errors + s.hash_errors);
        let batch = self.batch.as_ref().map_or(0, BatchResult::failure_count);
        scan + batch
    }
}

/// Owns every piece of the core and exposes commands and queries.
pub struct Workspace {
    folders: RwLock<FolderSet>,
    registry: RwLock<Arc<FileRegistry>>,
    controller: Arc<OperationController>,
    limiter: Arc<ResourceLimiter>,
    volumes: Arc<VolumeMap>,
    finder: RwLock<FinderConfig>,
    disposer: Arc<dyn Disposer>,
    observers: RwLock<Vec<Arc<dyn StateObserver>>>,
    stats: StatisticsCache,
    worker: Mutex<Option<JoinHandle<()>>>,
    last: Arc<Mutex<Option<RunSummary>>>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("folders", &read(&self.folders).len())
            .field("state", &self.controller.state())
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "background operation panicked".to_string())
}

impl Workspace {
    /// Build a workspace, detecting mounted volumes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Limiter`] if the worker pool cannot start.
    pub fn new(config: WorkspaceConfig) -> Result<Self, WorkspaceError> {
        Self::with_volumes(config, VolumeMap::detect())
    }

    /// Build a workspace with an explicit volume map.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Limiter`] if the worker pool cannot start.
    pub fn with_volumes(
        config: WorkspaceConfig,
        volumes: VolumeMap,
    ) -> Result<Self, WorkspaceError> {
        let limiter = ResourceLimiter::new(config.limiter)?;
        Ok(Self {
            folders: RwLock::new(FolderSet::new()),
            registry: RwLock::new(Arc::new(FileRegistry::new())),
            controller: Arc::new(OperationController::new()),
            limiter: Arc::new(limiter),
            volumes: Arc::new(volumes),
            finder: RwLock::new(config.finder),
            disposer: Arc::new(TrashDisposer),
            observers: RwLock::new(Vec::new()),
            stats: StatisticsCache::new(),
            worker: Mutex::new(None),
            last: Arc::new(Mutex::new(None)),
        })
    }

    /// Replace how deleted files are disposed of. Defaults to the trash.
    #[must_use]
    pub fn with_disposer(mut self, disposer: Arc<dyn Disposer>) -> Self {
        self.disposer = disposer;
        self
    }

    /// Add a root folder.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Folder`] if the folder overlaps an existing root.
    pub fn add_folder(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let mut folders = write(&self.folders);
        let root = folders.add(path)?;
        Ok(root.path().to_path_buf())
    }

    /// Remove a root folder. Existing entries are kept until the next scan.
    pub fn remove_folder(&self, path: impl AsRef<Path>) -> bool {
        write(&self.folders).remove(path)
    }

    /// Current roots.
    #[must_use]
    pub fn folders(&self) -> Vec<FolderRoot> {
        read(&self.folders).roots().to_vec()
    }

    /// Show or hide entries in `state` under `root`.
    pub fn set_visibility(&self, root: &Path, state: FileState, visible: bool) -> bool {
        write(&self.folders).set_visibility(root, state, visible)
    }

    /// Replace the scan settings used by the next scan.
    pub fn set_finder_config(&self, config: FinderConfig) {
        *write(&self.finder) = config;
    }

    /// Register an observer on the current and every future registry.
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) {
        self.registry().subscribe(Arc::clone(&observer));
        write(&self.observers).push(observer);
    }

    /// Start a scan of every root on a background thread.
    ///
    /// The previous registry is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Busy`] while another operation is active.
    pub fn start_scan(&self) -> Result<(), WorkspaceError> {
        let run = self.controller.begin(OperationKind::Scan, SCAN_STEPS)?;
        self.reap();

        let roots = read(&self.folders).paths();
        let registry = Arc::new(FileRegistry::new());
        for observer in read(&self.observers).iter() {
            registry.subscribe(Arc::clone(observer));
        }
        *write(&self.registry) = Arc::clone(&registry);

        let finder = DuplicateFinder::new(
            read(&self.finder).clone(),
            Arc::clone(&self.limiter),
            Arc::clone(&self.volumes),
        );
        self.spawn(run, move |run| {
            let scan = finder.run(&roots, &registry, run);
            match scan {
                Ok(summary) => (RunResult::Completed, Some(summary), None),
                Err(e) if e.is_cancelled() => (RunResult::Cancelled, None, None),
                Err(e) => (RunResult::Failed(e.to_string()), None, None),
            }
        })
    }

    /// Move `selection` to the trash on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Busy`] while another operation is active.
    pub fn start_delete(&self, selection: Vec<Arc<FileEntry>>) -> Result<(), WorkspaceError> {
        let run = self.controller.begin(OperationKind::Delete, 1)?;
        self.reap();

        let limiter = Arc::clone(&self.limiter);
        let disposer = Arc::clone(&self.disposer);
        self.spawn(run, move |run| {
            let batch = delete_entries(&selection, disposer.as_ref(), &limiter, run);
            (RunResult::Completed, None, Some(batch))
        })
    }

    /// Copy `selection` under `destination` on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Busy`] while another operation is active.
    pub fn start_copy(
        &self,
        destination: impl Into<PathBuf>,
        selection: Vec<Arc<FileEntry>>,
    ) -> Result<(), WorkspaceError> {
        let run = self.controller.begin(OperationKind::Copy, 1)?;
        self.reap();

        let destination = destination.into();
        let roots = read(&self.folders).paths();
        let limiter = Arc::clone(&self.limiter);
        self.spawn(run, move |run| {
            let batch = copy_entries(&selection, &roots, &destination, &limiter, run);
            (RunResult::Completed, None, Some(batch))
        })
    }

    /// Pause the active operation.
    pub fn pause(&self) -> bool {
        self.controller.pause()
    }

    /// Resume a paused operation.
    pub fn resume(&self) -> bool {
        self.controller.resume()
    }

    /// Ask the active operation to stop.
    pub fn cancel(&self) -> bool {
        self.controller.cancel()
    }

    /// Block until the background operation ends, returning its summary.
    pub fn wait(&self) -> Option<RunSummary> {
        self.reap();
        self.last_report()
    }

    fn reap(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Background operation thread panicked");
            }
        }
    }

    fn spawn<F>(&self, run: RunContext, job: F) -> Result<(), WorkspaceError>
    where
        F: FnOnce(&RunContext) -> (RunResult, Option<ScanSummary>, Option<BatchResult>)
            + Send
            + 'static,
    {
        let controller = Arc::clone(&self.controller);
        let last = Arc::clone(&self.last);
        let kind = run.kind();
        let thread = std::thread::Builder::new().name(format!("dupsweep-{kind}"));

        let spawned = thread.spawn(move || {
            let started = Instant::now();
            let (result, scan, batch) = match panic::catch_unwind(AssertUnwindSafe(|| job(&run))) {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("{kind} panicked: {message}");
                    (RunResult::Failed(message), None, None)
                }
            };
            let error = match &result {
                RunResult::Failed(message) => Some(message.clone()),
                _ => None,
            };
            controller.finish(result);

            let summary = RunSummary {
                kind,
                outcome: controller.state(),
                scan,
                batch,
                error,
                duration: started.elapsed(),
            };
            log::info!("{kind} finished: {}", summary.outcome);
            *last.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary);
        });

        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.controller.finish(RunResult::Failed(e.to_string()));
                Err(WorkspaceError::Spawn(e))
            }
        }
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> OperationState {
        self.controller.state()
    }

    /// Overall progress in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.controller.fraction()
    }

    /// Full progress snapshot.
    #[must_use]
    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        self.controller.progress()
    }

    /// Estimated time left in the current step.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        self.controller.eta()
    }

    /// The controller, for callers that poll it directly.
    #[must_use]
    pub fn controller(&self) -> &Arc<OperationController> {
        &self.controller
    }

    /// The registry produced by the latest scan.
    #[must_use]
    pub fn registry(&self) -> Arc<FileRegistry> {
        Arc::clone(&read(&self.registry))
    }

    /// Aggregate byte/file counts, cached until the registry changes.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.stats.get(&self.registry())
    }

    /// Every entry in display order.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<EntrySnapshot> {
        self.registry().sorted()
    }

    /// Entries passing the folder visibility filter, in display order.
    #[must_use]
    pub fn visible_entries(&self) -> Vec<EntrySnapshot> {
        let folders = read(&self.folders);
        let mut visible: Vec<EntrySnapshot> = self
            .registry()
            .entries()
            .iter()
            .filter(|e| folders.shows_entry(e))
            .map(|e| e.snapshot())
            .collect();
        sort_snapshots(&mut visible);
        visible
    }

    /// Duplicate groups of the latest scan.
    #[must_use]
    pub fn groups(&self) -> Vec<DuplicateGroup> {
        registry_groups(&self.registry())
    }

    /// Entries currently in `state`.
    #[must_use]
    pub fn entries_in(&self, state: FileState) -> Vec<Arc<FileEntry>> {
        self.registry().in_state(state)
    }

    /// Summary of the last finished operation.
    #[must_use]
    pub fn last_report(&self) -> Option<RunSummary> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.controller.cancel();
        self.reap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::delete::DeleteError;
    use std::fs;
    use tempfile::TempDir;

    struct RemoveDisposer;

    impl Disposer for RemoveDisposer {
        fn dispose(&self, path: &Path) -> Result<(), DeleteError> {
            fs::remove_file(path).map_err(|e| DeleteError::from_io(path, e))
        }
    }

    fn workspace() -> Workspace {
        let config = WorkspaceConfig {
            limiter: LimiterConfig::default().with_workers(2),
            ..WorkspaceConfig::default()
        };
        Workspace::with_volumes(config, VolumeMap::default())
            .unwrap()
            .with_disposer(Arc::new(RemoveDisposer))
    }

    #[test]
    fn test_scan_then_delete() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), b"twin").unwrap();
        fs::write(dir.path().join("bb"), b"twin").unwrap();
        fs::write(dir.path().join("c"), b"solo!").unwrap();

        let ws = workspace();
        ws.add_folder(dir.path()).unwrap();
        ws.start_scan().unwrap();
        let report = ws.wait().unwrap();
        assert_eq!(report.outcome, OperationState::Completed);
        assert_eq!(report.scan.as_ref().unwrap().duplicate_groups, 1);

        let stats = ws.statistics();
        assert_eq!(stats.total.files, 3);
        assert_eq!(stats.delete.files, 1);
        assert_eq!(stats.remaining_after_delete.files, 2);

        ws.start_delete(ws.entries_in(FileState::Delete)).unwrap();
        let report = ws.wait().unwrap();
        assert_eq!(report.kind, OperationKind::Delete);
        assert_eq!(report.batch.unwrap().succeeded, 1);
        assert!(!dir.path().join("bb").exists());
        assert_eq!(ws.statistics().deleted.files, 1);
    }

    #[test]
    fn test_busy_while_running() {
        let ws = workspace();
        let run = ws.controller().begin(OperationKind::Copy, 1).unwrap();
        assert!(matches!(ws.start_scan(), Err(WorkspaceError::Busy(_))));
        ws.controller().finish(RunResult::Completed);
        drop(run);
    }

    #[test]
    fn test_visible_entries_follow_folder_flags() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x"), b"1").unwrap();
        fs::write(dir.path().join("y"), b"22").unwrap();

        let ws = workspace();
        ws.add_folder(dir.path()).unwrap();
        ws.start_scan().unwrap();
        ws.wait();
        assert_eq!(ws.visible_entries().len(), 2);

        let root = ws.folders()[0].path().to_path_buf();
        ws.set_visibility(&root, FileState::Unique, false);
        assert!(ws.visible_entries().is_empty());

        ws.remove_folder(&root);
        assert_eq!(ws.sorted_entries().len(), 2);
        assert!(ws.visible_entries().is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "background operation panicked");
    }
}
