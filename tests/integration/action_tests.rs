use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dupsweep::actions::delete::{DeleteError, Disposer};
use dupsweep::control::{OperationKind, OperationState};
use dupsweep::duplicates::FinderConfig;
use dupsweep::limiter::{LimiterConfig, VolumeMap};
use dupsweep::registry::FileState;
use dupsweep::workspace::{Workspace, WorkspaceConfig};
use filetime::{set_file_mtime, FileTime};
use tempfile::tempdir;

/// Removes files from disk and records every path it was handed.
#[derive(Default)]
struct RecordingDisposer {
    seen: Mutex<Vec<PathBuf>>,
}

impl Disposer for RecordingDisposer {
    fn dispose(&self, path: &Path) -> Result<(), DeleteError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        fs::remove_file(path).map_err(|e| DeleteError::from_io(path, e))
    }
}

fn workspace(disposer: Arc<dyn Disposer>) -> Workspace {
    let config = WorkspaceConfig {
        finder: FinderConfig::default(),
        limiter: LimiterConfig::default().with_workers(2),
    };
    Workspace::with_volumes(config, VolumeMap::default())
        .unwrap()
        .with_disposer(disposer)
}

fn scanned(ws: &Workspace, root: &Path) {
    ws.add_folder(root).unwrap();
    ws.start_scan().unwrap();
    assert_eq!(ws.wait().unwrap().outcome, OperationState::Completed);
}

#[test]
fn test_delete_redundant_copies() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"duplicate").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/a.txt"), b"duplicate").unwrap();
    fs::write(dir.path().join("sub/other.txt"), b"duplicate").unwrap();
    fs::write(dir.path().join("lonely.txt"), b"lonely").unwrap();

    let disposer = Arc::new(RecordingDisposer::default());
    let ws = workspace(Arc::clone(&disposer) as Arc<dyn Disposer>);
    scanned(&ws, dir.path());

    let before = ws.statistics();
    assert_eq!(before.delete.files, 2);
    assert_eq!(before.delete.bytes, 18);

    ws.start_delete(ws.entries_in(FileState::Delete)).unwrap();
    let report = ws.wait().unwrap();
    assert_eq!(report.kind, OperationKind::Delete);
    assert_eq!(report.outcome, OperationState::Completed);

    let batch = report.batch.unwrap();
    assert_eq!(batch.succeeded, 2);
    assert_eq!(batch.bytes, 18);
    assert!(batch.all_succeeded());
    assert_eq!(disposer.seen.lock().unwrap().len(), 2);

    assert!(dir.path().join("a.txt").exists());
    assert!(!dir.path().join("sub/a.txt").exists());
    assert!(!dir.path().join("sub/other.txt").exists());
    assert!(dir.path().join("lonely.txt").exists());

    let after = ws.statistics();
    assert_eq!(after.deleted.files, 2);
    assert_eq!(after.delete.files, 0);
    assert_eq!(after.keep.files, 1);
}

#[test]
fn test_delete_skips_modified_file() {
    let dir = tempdir().unwrap();
    let keep = dir.path().join("k");
    let changed = dir.path().join("long-name");
    fs::write(&keep, b"original").unwrap();
    fs::write(&changed, b"original").unwrap();

    let disposer = Arc::new(RecordingDisposer::default());
    let ws = workspace(Arc::clone(&disposer) as Arc<dyn Disposer>);
    scanned(&ws, dir.path());

    set_file_mtime(&changed, FileTime::from_unix_time(1_000_000, 0)).unwrap();
    ws.start_delete(ws.entries_in(FileState::Delete)).unwrap();
    let batch = ws.wait().unwrap().batch.unwrap();

    assert_eq!(batch.succeeded, 0);
    assert_eq!(batch.failure_count(), 1);
    assert!(batch.failures[0].1.contains("modified"));
    assert!(disposer.seen.lock().unwrap().is_empty());
    assert!(changed.exists());
    assert_eq!(ws.registry().count_in_state(FileState::Delete), 1);
}

#[test]
fn test_delete_vanished_file_is_a_soft_failure() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"same").unwrap();
    fs::write(dir.path().join("bb"), b"same").unwrap();
    fs::write(dir.path().join("c"), b"solo!").unwrap();

    let ws = workspace(Arc::new(RecordingDisposer::default()));
    scanned(&ws, dir.path());

    let selection = ws.entries_in(FileState::Delete);
    assert_eq!(selection.len(), 1);
    fs::remove_file(selection[0].path()).unwrap();
    ws.start_delete(selection).unwrap();
    let report = ws.wait().unwrap();

    assert_eq!(report.outcome, OperationState::Completed);
    let batch = report.batch.unwrap();
    assert_eq!(batch.succeeded, 0);
    assert_eq!(batch.failure_count(), 1);
}

#[test]
fn test_copy_keep_and_unique_preserves_layout() {
    let photos = tempdir().unwrap();
    let backup = tempdir().unwrap();
    let dest = tempdir().unwrap();
    fs::create_dir_all(photos.path().join("2020")).unwrap();
    fs::write(photos.path().join("2020/beach.jpg"), b"sand and sea").unwrap();
    fs::write(photos.path().join("cat.jpg"), b"meow").unwrap();
    fs::write(backup.path().join("beach-copy.jpg"), b"sand and sea").unwrap();

    let ws = workspace(Arc::new(RecordingDisposer::default()));
    ws.add_folder(photos.path()).unwrap();
    ws.add_folder(backup.path()).unwrap();
    ws.start_scan().unwrap();
    ws.wait();

    let mut selection = ws.entries_in(FileState::Keep);
    selection.extend(ws.entries_in(FileState::Unique));
    assert_eq!(selection.len(), 2);

    ws.start_copy(dest.path(), selection).unwrap();
    let report = ws.wait().unwrap();
    assert_eq!(report.kind, OperationKind::Copy);
    let batch = report.batch.unwrap();
    assert_eq!(batch.succeeded, 2);
    assert_eq!(batch.bytes, 16);

    assert_eq!(fs::read(dest.path().join("cat.jpg")).unwrap(), b"meow");
    let beach = if dest.path().join("2020/beach.jpg").exists() {
        dest.path().join("2020/beach.jpg")
    } else {
        dest.path().join("beach-copy.jpg")
    };
    assert_eq!(fs::read(beach).unwrap(), b"sand and sea");

    // Copying never changes entry states.
    assert_eq!(ws.statistics().keep.files, 1);
    assert_eq!(ws.statistics().delete.files, 1);
}

#[test]
fn test_copy_overwrites_existing_target() {
    let src = tempdir().unwrap();
    let dest = tempdir().unwrap();
    fs::write(src.path().join("f"), b"new contents").unwrap();
    fs::write(dest.path().join("f"), b"stale").unwrap();

    let ws = workspace(Arc::new(RecordingDisposer::default()));
    scanned(&ws, src.path());
    ws.start_copy(dest.path(), ws.entries_in(FileState::Unique))
        .unwrap();
    assert_eq!(ws.wait().unwrap().batch.unwrap().succeeded, 1);
    assert_eq!(fs::read(dest.path().join("f")).unwrap(), b"new contents");
}
