use std::fs;

use dupsweep::folders::{ConflictKind, FolderError};
use dupsweep::limiter::VolumeMap;
use dupsweep::registry::FileState;
use dupsweep::workspace::{Workspace, WorkspaceConfig, WorkspaceError};
use tempfile::tempdir;

fn workspace() -> Workspace {
    Workspace::with_volumes(WorkspaceConfig::default(), VolumeMap::default()).unwrap()
}

fn conflict_kind(err: WorkspaceError) -> ConflictKind {
    match err {
        WorkspaceError::Folder(FolderError::Conflict { kind, .. }) => kind,
        other => panic!("expected a folder conflict, got {other:?}"),
    }
}

#[test]
fn test_parent_of_existing_root_is_rejected() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = a.join("b");
    let b2 = a.join("b2");
    for path in [&b, &b2] {
        fs::create_dir_all(path).unwrap();
    }

    let ws = workspace();
    ws.add_folder(&b).unwrap();
    let err = ws.add_folder(&a).unwrap_err();
    assert_eq!(conflict_kind(err), ConflictKind::ContainsExisting);

    ws.add_folder(&b2).unwrap();
    assert_eq!(ws.folders().len(), 2);
}

#[test]
fn test_child_and_duplicate_rejected() {
    let dir = tempdir().unwrap();
    let ws = workspace();
    ws.add_folder(dir.path()).unwrap();

    let err = ws.add_folder(dir.path().join("child")).unwrap_err();
    assert_eq!(conflict_kind(err), ConflictKind::NestedInside);

    let err = ws.add_folder(dir.path()).unwrap_err();
    assert_eq!(conflict_kind(err), ConflictKind::Duplicate);
}

#[test]
fn test_sibling_prefix_is_not_nested() {
    let dir = tempdir().unwrap();
    let ws = workspace();
    ws.add_folder(dir.path().join("data/foo")).unwrap();
    ws.add_folder(dir.path().join("data/foobar")).unwrap();
    assert_eq!(ws.folders().len(), 2);
}

#[test]
fn test_removed_root_can_be_replaced_by_parent() {
    let dir = tempdir().unwrap();
    let child = dir.path().join("child");
    let ws = workspace();
    ws.add_folder(&child).unwrap();

    assert!(ws.remove_folder(&child));
    assert!(!ws.remove_folder(&child));
    ws.add_folder(dir.path()).unwrap();
}

#[test]
fn test_visibility_is_per_root() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    fs::write(left.path().join("l"), b"left only").unwrap();
    fs::write(right.path().join("r"), b"right!").unwrap();

    let ws = workspace();
    let left_root = ws.add_folder(left.path()).unwrap();
    ws.add_folder(right.path()).unwrap();
    ws.start_scan().unwrap();
    ws.wait();
    assert_eq!(ws.visible_entries().len(), 2);

    assert!(ws.set_visibility(&left_root, FileState::Unique, false));
    let visible = ws.visible_entries();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].path.ends_with("r"));

    assert!(!ws.set_visibility(&left.path().join("nope"), FileState::Unique, false));
}

#[test]
fn test_sort_order_groups_first() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("big1"), vec![1u8; 300]).unwrap();
    fs::write(dir.path().join("big2"), vec![1u8; 300]).unwrap();
    fs::write(dir.path().join("small1"), vec![2u8; 10]).unwrap();
    fs::write(dir.path().join("small2"), vec![2u8; 10]).unwrap();
    fs::write(dir.path().join("loner"), vec![3u8; 1000]).unwrap();

    let ws = workspace();
    ws.add_folder(dir.path()).unwrap();
    ws.start_scan().unwrap();
    ws.wait();

    let sorted = ws.sorted_entries();
    let groups: Vec<Option<u64>> = sorted.iter().map(|e| e.group).collect();
    assert_eq!(groups.len(), 5);
    assert!(groups[..4].iter().all(Option::is_some));
    assert!(groups[0] <= groups[2]);
    assert_eq!(groups[4], None);
    assert!(sorted[0].path < sorted[1].path);
}

#[test]
fn test_dotted_path_into_existing_root_is_rejected() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    fs::create_dir_all(a.join("sub")).unwrap();
    fs::create_dir_all(dir.path().join("x")).unwrap();
    fs::write(a.join("sub/only.txt"), b"single copy").unwrap();

    let ws = workspace();
    ws.add_folder(&a).unwrap();
    let err = ws.add_folder(dir.path().join("x/../a/sub")).unwrap_err();
    assert_eq!(conflict_kind(err), ConflictKind::NestedInside);

    ws.start_scan().unwrap();
    ws.wait();
    assert_eq!(ws.registry().len(), 1);
    assert!(ws.entries_in(FileState::Delete).is_empty());
}
