use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dupsweep::control::OperationState;
use dupsweep::duplicates::FinderConfig;
use dupsweep::limiter::{LimiterConfig, VolumeMap};
use dupsweep::registry::FileState;
use dupsweep::scanner::{HashAlgorithm, WalkerConfig};
use dupsweep::workspace::{RunSummary, Workspace, WorkspaceConfig};
use tempfile::tempdir;

fn workspace(finder: FinderConfig) -> Workspace {
    let config = WorkspaceConfig {
        finder,
        limiter: LimiterConfig::default().with_workers(4),
    };
    Workspace::with_volumes(config, VolumeMap::default()).unwrap()
}

fn scan(ws: &Workspace) -> RunSummary {
    ws.start_scan().unwrap();
    let report = ws.wait().unwrap();
    assert_eq!(report.outcome, OperationState::Completed, "{:?}", report.error);
    report
}

fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn states(ws: &Workspace) -> BTreeMap<PathBuf, FileState> {
    ws.sorted_entries()
        .into_iter()
        .map(|e| (e.path, e.state))
        .collect()
}

#[test]
fn test_scan_empty_folder() {
    let dir = tempdir().unwrap();
    let ws = workspace(FinderConfig::default());
    ws.add_folder(dir.path()).unwrap();

    let report = scan(&ws);
    let summary = report.scan.unwrap();
    assert_eq!(summary.files_scanned, 0);
    assert_eq!(summary.duplicate_groups, 0);
    assert!(ws.groups().is_empty());
}

#[test]
fn test_scan_without_folders_completes() {
    let ws = workspace(FinderConfig::default());
    let report = scan(&ws);
    assert_eq!(report.scan.unwrap().files_scanned, 0);
}

#[test]
fn test_duplicates_across_roots() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    write(&a.path().join("x/photo.jpg"), b"same picture");
    write(&b.path().join("deeper/path/photo-copy.jpg"), b"same picture");
    write(&a.path().join("notes.txt"), b"only here");

    let ws = workspace(FinderConfig::default());
    ws.add_folder(a.path()).unwrap();
    ws.add_folder(b.path()).unwrap();
    let summary = scan(&ws).scan.unwrap();

    assert_eq!(summary.files_scanned, 3);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.duplicate_files, 1);
    assert_eq!(summary.reclaimable_bytes, 12);

    let groups = ws.groups();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.len(), 2);
    assert!(group.digest.is_some());
    assert_eq!(group.delete.len(), 1);
    assert!(group.keep.is_some());

    let stats = ws.statistics();
    assert_eq!(stats.unique.files, 1);
    assert_eq!(stats.keep.files, 1);
    assert_eq!(stats.delete.files, 1);
}

#[test]
fn test_keeper_is_shortest_path() {
    let dir = tempdir().unwrap();
    let short = dir.path().join("a/f");
    let long = dir.path().join("a/nested/f");
    let tie = dir.path().join("b/f");
    for path in [&short, &long, &tie] {
        write(path, b"triplet");
    }

    let ws = workspace(FinderConfig::default());
    ws.add_folder(dir.path()).unwrap();
    scan(&ws);

    let groups = ws.groups();
    assert_eq!(groups.len(), 1);
    // `a/f` and `b/f` have equal length; the lexicographically smaller wins.
    assert_eq!(groups[0].keep.as_deref(), Some(short.as_path()));
    assert_eq!(groups[0].delete.len(), 2);
}

#[test]
fn test_distinct_sizes_are_never_hashed() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("one"), b"1");
    write(&dir.path().join("two"), b"22");
    write(&dir.path().join("three"), b"333");

    let ws = workspace(FinderConfig::default());
    ws.add_folder(dir.path()).unwrap();
    let summary = scan(&ws).scan.unwrap();

    assert_eq!(summary.unique_by_size, 3);
    assert_eq!(summary.hashed_files, 0);
    for entry in ws.sorted_entries() {
        assert_eq!(entry.state, FileState::Unique);
        assert!(entry.digest.is_none());
    }
}

#[test]
fn test_same_size_different_content() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("left"), b"abcdef");
    write(&dir.path().join("right"), b"abcdeg");

    let ws = workspace(FinderConfig::default());
    ws.add_folder(dir.path()).unwrap();
    let summary = scan(&ws).scan.unwrap();

    assert_eq!(summary.hashed_files, 2);
    assert_eq!(summary.duplicate_groups, 0);
    for entry in ws.sorted_entries() {
        assert_eq!(entry.state, FileState::Unique);
        assert!(entry.digest.is_some());
    }
}

#[test]
fn test_crc32_collision_grouped_without_verify() {
    // "plumless" and "buckeroo" share a CRC32.
    let dir = tempdir().unwrap();
    write(&dir.path().join("plumless"), b"plumless");
    write(&dir.path().join("buckeroo"), b"buckeroo");

    let ws = workspace(FinderConfig::default().with_algorithm(HashAlgorithm::Crc32));
    ws.add_folder(dir.path()).unwrap();
    let summary = scan(&ws).scan.unwrap();

    assert_eq!(summary.comparisons, 0);
    assert_eq!(summary.duplicate_groups, 1);
}

#[test]
fn test_crc32_collision_split_by_verify() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("plumless"), b"plumless");
    write(&dir.path().join("buckeroo"), b"buckeroo");

    let ws = workspace(
        FinderConfig::default()
            .with_algorithm(HashAlgorithm::Crc32)
            .with_verify(true),
    );
    ws.add_folder(dir.path()).unwrap();
    let summary = scan(&ws).scan.unwrap();

    assert_eq!(summary.comparisons, 1);
    assert_eq!(summary.digest_collisions, 1);
    assert_eq!(summary.duplicate_groups, 0);
    let entries = ws.sorted_entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.state == FileState::Unique));
    assert_eq!(entries[0].digest, entries[1].digest);
}

#[test]
fn test_verify_confirms_real_duplicates() {
    let dir = tempdir().unwrap();
    for name in ["a", "b", "c"] {
        write(&dir.path().join(name), &vec![7u8; 50_000]);
    }

    let ws = workspace(FinderConfig::default().with_verify(true));
    ws.add_folder(dir.path()).unwrap();
    let summary = scan(&ws).scan.unwrap();

    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.duplicate_files, 2);
    assert_eq!(summary.digest_collisions, 0);
}

#[test]
fn test_every_algorithm_finds_the_pair() {
    for algorithm in [
        HashAlgorithm::Crc32,
        HashAlgorithm::Md5,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake3,
    ] {
        let dir = tempdir().unwrap();
        write(&dir.path().join("one"), b"pair content");
        write(&dir.path().join("two"), b"pair content");
        write(&dir.path().join("odd"), b"pair contenT");

        let ws = workspace(FinderConfig::default().with_algorithm(algorithm));
        ws.add_folder(dir.path()).unwrap();
        scan(&ws);

        let groups = ws.groups();
        assert_eq!(groups.len(), 1, "{algorithm:?}");
        assert_eq!(
            groups[0].digest.as_ref().map(String::len),
            Some(algorithm.hex_len()),
            "{algorithm:?}"
        );
    }
}

#[test]
fn test_rescan_is_idempotent() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a/1"), b"dup");
    write(&dir.path().join("b/1"), b"dup");
    write(&dir.path().join("c/1"), b"dup");
    write(&dir.path().join("u"), b"unique!");
    write(&dir.path().join("v"), b"other!!");

    let ws = workspace(FinderConfig::default());
    ws.add_folder(dir.path()).unwrap();
    scan(&ws);
    let first = states(&ws);
    let first_groups = ws.groups();

    scan(&ws);
    assert_eq!(states(&ws), first);
    assert_eq!(ws.groups(), first_groups);
}

#[test]
fn test_empty_files_follow_walker_filter() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("e1"), b"");
    write(&dir.path().join("e2"), b"");

    let ws = workspace(FinderConfig::default());
    ws.add_folder(dir.path()).unwrap();
    assert_eq!(scan(&ws).scan.unwrap().duplicate_groups, 1);

    let skipping = FinderConfig::default().with_walker(WalkerConfig::default().with_skip_empty(true));
    ws.set_finder_config(skipping);
    assert_eq!(scan(&ws).scan.unwrap().files_scanned, 0);
}

#[test]
fn test_ignore_patterns_exclude_files() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("keep.txt"), b"same");
    write(&dir.path().join("skip.tmp"), b"same");

    let walker = WalkerConfig::default().with_ignore_patterns(vec!["*.tmp".to_string()]);
    let ws = workspace(FinderConfig::default().with_walker(walker));
    ws.add_folder(dir.path()).unwrap();
    let summary = scan(&ws).scan.unwrap();

    assert_eq!(summary.files_scanned, 1);
    assert_eq!(summary.duplicate_groups, 0);
}

#[test]
fn test_rescan_replaces_registry() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a"), b"twin");
    write(&dir.path().join("b"), b"twin");

    let ws = workspace(FinderConfig::default());
    ws.add_folder(dir.path()).unwrap();
    scan(&ws);
    let before = ws.registry();

    fs::remove_file(dir.path().join("b")).unwrap();
    scan(&ws);
    assert!(!Arc::ptr_eq(&before, &ws.registry()));
    assert_eq!(ws.registry().len(), 1);
    assert!(ws.groups().is_empty());
}
