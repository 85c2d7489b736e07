use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dupsweep::actions::delete::{DeleteError, Disposer};
use dupsweep::control::{OperationController, OperationKind, OperationState};
use dupsweep::duplicates::FinderConfig;
use dupsweep::limiter::{LimiterConfig, VolumeMap};
use dupsweep::registry::{FileEntry, FileState, StateObserver};
use dupsweep::scanner::MIN_CHUNK_SIZE;
use dupsweep::workspace::{Workspace, WorkspaceConfig, WorkspaceError};
use tempfile::{tempdir, TempDir};

/// Pauses or cancels the run the first time an entry enters `trigger`.
struct Trip {
    controller: Arc<OperationController>,
    trigger: FileState,
    cancel: bool,
    fired: AtomicBool,
}

impl StateObserver for Trip {
    fn state_changed(&self, _entry: &FileEntry, _from: FileState, to: FileState) {
        if to == self.trigger && !self.fired.swap(true, Ordering::SeqCst) {
            if self.cancel {
                self.controller.cancel();
            } else {
                self.controller.pause();
            }
        }
    }
}

fn trip(ws: &Workspace, trigger: FileState, cancel: bool) {
    ws.subscribe(Arc::new(Trip {
        controller: Arc::clone(ws.controller()),
        trigger,
        cancel,
        fired: AtomicBool::new(false),
    }));
}

struct RemoveDisposer;

impl Disposer for RemoveDisposer {
    fn dispose(&self, path: &Path) -> Result<(), DeleteError> {
        fs::remove_file(path).map_err(|e| DeleteError::from_io(path, e))
    }
}

fn workspace() -> Workspace {
    let config = WorkspaceConfig {
        finder: FinderConfig::default().with_chunk_size(MIN_CHUNK_SIZE),
        limiter: LimiterConfig::default().with_workers(2),
    };
    Workspace::with_volumes(config, VolumeMap::default())
        .unwrap()
        .with_disposer(Arc::new(RemoveDisposer))
}

/// Pairs of identical multi-chunk files, so hashing takes a while.
fn large_pairs(pairs: usize) -> TempDir {
    let dir = tempdir().unwrap();
    for i in 0..pairs {
        let size = 4 * MIN_CHUNK_SIZE + i;
        let body = vec![i as u8; size];
        fs::write(dir.path().join(format!("{i}-a.bin")), &body).unwrap();
        fs::write(dir.path().join(format!("{i}-b.bin")), &body).unwrap();
    }
    dir
}

fn wait_for(ws: &Workspace, state: OperationState) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while ws.state() != state {
        assert!(Instant::now() < deadline, "never reached {state}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_pause_freezes_hashing_progress() {
    let dir = large_pairs(4);
    let ws = workspace();
    ws.add_folder(dir.path()).unwrap();
    trip(&ws, FileState::Hashing, false);

    ws.start_scan().unwrap();
    wait_for(&ws, OperationState::Paused);
    thread::sleep(Duration::from_millis(100));

    let frozen = ws.progress_snapshot();
    assert!(frozen.paused);
    let hashed_before = ws.registry().count_in_state(FileState::Hashed);
    thread::sleep(Duration::from_millis(300));
    let later = ws.progress_snapshot();
    assert_eq!(later.done, frozen.done);
    assert_eq!(later.step, frozen.step);
    assert_eq!(ws.registry().count_in_state(FileState::Hashed), hashed_before);
    assert_eq!(ws.state(), OperationState::Paused);

    assert!(ws.resume());
    let report = ws.wait().unwrap();
    assert_eq!(report.outcome, OperationState::Completed);
    assert_eq!(report.scan.unwrap().duplicate_groups, 4);
}

#[test]
fn test_pause_and_resume_are_rejected_when_idle() {
    let ws = workspace();
    assert!(!ws.pause());
    assert!(!ws.resume());
    assert!(!ws.cancel());
    assert_eq!(ws.state(), OperationState::Idle);
}

#[test]
fn test_cancel_during_hashing() {
    let dir = large_pairs(4);
    let ws = workspace();
    ws.add_folder(dir.path()).unwrap();
    trip(&ws, FileState::Hashing, true);

    ws.start_scan().unwrap();
    let report = ws.wait().unwrap();

    assert_eq!(report.outcome, OperationState::Cancelled);
    assert!(report.scan.is_none());
    let registry = ws.registry();
    assert_eq!(registry.count_in_state(FileState::Hashing), 0);
    assert_eq!(registry.count_in_state(FileState::Deleting), 0);
    assert_eq!(registry.count_in_state(FileState::Keep), 0);
}

#[test]
fn test_cancel_while_paused() {
    let dir = large_pairs(2);
    let ws = workspace();
    ws.add_folder(dir.path()).unwrap();
    trip(&ws, FileState::Hashing, false);

    ws.start_scan().unwrap();
    wait_for(&ws, OperationState::Paused);
    assert!(ws.cancel());

    let report = ws.wait().unwrap();
    assert_eq!(report.outcome, OperationState::Cancelled);
    assert_eq!(ws.registry().count_in_state(FileState::Hashing), 0);
}

#[test]
fn test_cancel_during_delete() {
    let dir = tempdir().unwrap();
    for i in 0..20 {
        fs::write(dir.path().join(format!("a{i:02}")), format!("content {i:02}")).unwrap();
        fs::write(dir.path().join(format!("b{i:02}")), format!("content {i:02}")).unwrap();
    }
    let ws = workspace();
    ws.add_folder(dir.path()).unwrap();
    ws.start_scan().unwrap();
    ws.wait();

    let selection = ws.entries_in(FileState::Delete);
    assert_eq!(selection.len(), 20);
    trip(&ws, FileState::Deleting, true);
    ws.start_delete(selection).unwrap();
    let report = ws.wait().unwrap();

    assert_eq!(report.outcome, OperationState::Cancelled);
    let batch = report.batch.unwrap();
    assert_eq!(batch.succeeded + batch.failure_count() + batch.skipped, 20);
    assert!(batch.succeeded >= 1);

    let registry = ws.registry();
    assert_eq!(registry.count_in_state(FileState::Deleting), 0);
    assert_eq!(registry.count_in_state(FileState::Deleted), batch.succeeded);
    assert_eq!(registry.count_in_state(FileState::Delete), batch.skipped);
}

#[test]
fn test_second_operation_is_busy() {
    let dir = large_pairs(2);
    let ws = workspace();
    ws.add_folder(dir.path()).unwrap();
    trip(&ws, FileState::Hashing, false);

    ws.start_scan().unwrap();
    wait_for(&ws, OperationState::Paused);
    assert!(matches!(ws.start_scan(), Err(WorkspaceError::Busy(_))));
    assert!(matches!(
        ws.start_copy(dir.path().join("out"), Vec::new()),
        Err(WorkspaceError::Busy(_))
    ));

    ws.resume();
    assert_eq!(ws.wait().unwrap().kind, OperationKind::Scan);
}

#[test]
fn test_progress_reaches_one_and_observers_see_every_entry() {
    #[derive(Default)]
    struct Counter {
        added: AtomicUsize,
        classified: AtomicUsize,
    }
    impl StateObserver for Counter {
        fn state_changed(&self, _entry: &FileEntry, _from: FileState, to: FileState) {
            if matches!(to, FileState::Unique | FileState::Keep | FileState::Delete) {
                self.classified.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn entry_added(&self, _entry: &FileEntry) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
    }

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"x").unwrap();
    fs::write(dir.path().join("b"), b"x").unwrap();
    fs::write(dir.path().join("c"), b"yy").unwrap();

    let ws = workspace();
    ws.add_folder(dir.path()).unwrap();
    let counter = Arc::new(Counter::default());
    ws.subscribe(Arc::clone(&counter) as Arc<dyn StateObserver>);
    ws.start_scan().unwrap();
    ws.wait();

    assert_eq!(ws.progress(), 1.0);
    assert_eq!(counter.added.load(Ordering::SeqCst), 3);
    assert_eq!(counter.classified.load(Ordering::SeqCst), 3);
}
