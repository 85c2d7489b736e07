use std::fs;
use std::path::Path;
use std::sync::Arc;

use dupsweep::actions::delete::{DeleteError, Disposer};
use dupsweep::duplicates::FinderConfig;
use dupsweep::limiter::{LimiterConfig, VolumeMap};
use dupsweep::registry::FileState;
use dupsweep::scanner::{IdentityTracker, WalkerConfig};
use dupsweep::workspace::{Workspace, WorkspaceConfig};
use tempfile::tempdir;

struct RemoveDisposer;

impl Disposer for RemoveDisposer {
    fn dispose(&self, path: &Path) -> Result<(), DeleteError> {
        fs::remove_file(path).map_err(|e| DeleteError::from_io(path, e))
    }
}

fn workspace(follow_symlinks: bool) -> Workspace {
    let walker = WalkerConfig::default().with_follow_symlinks(follow_symlinks);
    let config = WorkspaceConfig {
        finder: FinderConfig::default().with_walker(walker),
        limiter: LimiterConfig::default().with_workers(2),
    };
    Workspace::with_volumes(config, VolumeMap::default())
        .unwrap()
        .with_disposer(Arc::new(RemoveDisposer))
}

#[test]
fn test_hardlinks_to_same_file_not_counted_as_duplicates() {
    let dir = tempdir().unwrap();
    let original = dir.path().join("original.txt");
    fs::write(&original, b"identical content").unwrap();
    if let Err(e) = fs::hard_link(&original, dir.path().join("hardlink.txt")) {
        eprintln!("Skipping hardlink test: {e}");
        return;
    }

    let ws = workspace(false);
    ws.add_folder(dir.path()).unwrap();
    ws.start_scan().unwrap();
    let summary = ws.wait().unwrap().scan.unwrap();

    if IdentityTracker::is_supported() {
        assert_eq!(summary.files_scanned, 1);
        assert_eq!(summary.aliases_skipped, 1);
        assert_eq!(summary.duplicate_groups, 0);
        assert_eq!(summary.reclaimable_bytes, 0);
    }
}

#[cfg(unix)]
#[test]
fn test_followed_symlink_never_marks_target_for_deletion() {
    let dir = tempdir().unwrap();
    let real = dir.path().join("deep/nested/real.bin");
    fs::create_dir_all(real.parent().unwrap()).unwrap();
    fs::write(&real, b"the only copy").unwrap();
    std::os::unix::fs::symlink(&real, dir.path().join("l")).unwrap();

    let ws = workspace(true);
    ws.add_folder(dir.path()).unwrap();
    ws.start_scan().unwrap();
    let summary = ws.wait().unwrap().scan.unwrap();

    assert_eq!(summary.duplicate_groups, 0);
    let entries = ws.sorted_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, real);
    assert_eq!(entries[0].state, FileState::Unique);

    ws.start_delete(ws.entries_in(FileState::Delete)).unwrap();
    ws.wait();
    assert!(real.exists());
}

#[cfg(unix)]
#[test]
fn test_symlinked_root_does_not_double_count() {
    let data = tempdir().unwrap();
    let links = tempdir().unwrap();
    fs::write(data.path().join("a.txt"), b"alpha").unwrap();
    fs::write(data.path().join("b.txt"), b"alpha").unwrap();
    let alias = links.path().join("data");
    std::os::unix::fs::symlink(data.path(), &alias).unwrap();

    let ws = workspace(false);
    ws.add_folder(data.path()).unwrap();
    ws.add_folder(&alias).unwrap();
    ws.start_scan().unwrap();
    let summary = ws.wait().unwrap().scan.unwrap();

    // One real pair; the second root only repeats it.
    assert_eq!(summary.files_scanned, 2);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.duplicate_files, 1);
}
