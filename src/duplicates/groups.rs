//! Partitioning and grouping helpers for the duplicate pipeline.
//!
//! Everything here is pure bookkeeping over registry entries: no I/O and no
//! state transitions. The finder decides what to do with the partitions.
//!
//! # Example
//!
//! ```
//! use dupsweep::duplicates::groups::UnionFind;
//!
//! let mut sets = UnionFind::new(4);
//! sets.union(0, 2);
//! sets.union(2, 3);
//! assert!(sets.connected(0, 3));
//! assert!(!sets.connected(0, 1));
//! assert_eq!(sets.clusters(), vec![vec![0, 2, 3]]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::limiter::VolumeId;
use crate::registry::{EntrySnapshot, FileEntry, FileRegistry, FileState};

/// Result of splitting entries by exact size.
#[derive(Debug, Default)]
pub struct SizePartition {
    /// Entries whose size no other entry shares.
    pub singletons: Vec<Arc<FileEntry>>,
    /// Entries sharing a size with at least one other entry.
    pub candidates: Vec<Arc<FileEntry>>,
    /// Number of distinct sizes with two or more entries.
    pub candidate_sizes: usize,
}

impl SizePartition {
    /// Fraction of entries eliminated without reading them, in percent.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        let total = self.singletons.len() + self.candidates.len();
        if total == 0 {
            0.0
        } else {
            self.singletons.len() as f64 / total as f64 * 100.0
        }
    }

    /// Bytes that must be read to hash every candidate.
    #[must_use]
    pub fn candidate_bytes(&self) -> u64 {
        self.candidates.iter().map(|e| e.size()).sum()
    }
}

/// Split `entries` into unique-size singletons and same-size candidates.
#[must_use]
pub fn partition_by_size(entries: &[Arc<FileEntry>]) -> SizePartition {
    let mut by_size: HashMap<u64, Vec<Arc<FileEntry>>> = HashMap::new();
    for entry in entries {
        by_size.entry(entry.size()).or_default().push(Arc::clone(entry));
    }

    let mut partition = SizePartition::default();
    for (_, mut group) in by_size {
        if group.len() == 1 {
            partition.singletons.append(&mut group);
        } else {
            partition.candidate_sizes += 1;
            partition.candidates.append(&mut group);
        }
    }
    partition
}

/// Group entries by the volume they live on.
#[must_use]
pub fn group_by_volume(entries: Vec<Arc<FileEntry>>) -> BTreeMap<VolumeId, Vec<Arc<FileEntry>>> {
    let mut by_volume: BTreeMap<VolumeId, Vec<Arc<FileEntry>>> = BTreeMap::new();
    for entry in entries {
        by_volume
            .entry(entry.volume().clone())
            .or_default()
            .push(entry);
    }
    by_volume
}

/// Key of a hash group: size first, so a weak digest can never merge files
/// of different lengths.
pub type DigestKey = (u64, String);

/// Group entries that carry a digest by `(size, digest)`.
///
/// Members of each group are sorted by path so downstream decisions are
/// deterministic. Entries without a digest are skipped.
#[must_use]
pub fn group_by_digest(entries: &[Arc<FileEntry>]) -> BTreeMap<DigestKey, Vec<Arc<FileEntry>>> {
    let mut groups: BTreeMap<DigestKey, Vec<Arc<FileEntry>>> = BTreeMap::new();
    for entry in entries {
        if let Some(digest) = entry.digest() {
            groups
                .entry((entry.size(), digest))
                .or_default()
                .push(Arc::clone(entry));
        }
    }
    for members in groups.values_mut() {
        members.sort_by(|a, b| a.path().cmp(b.path()));
    }
    groups
}

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Representative of `x`'s set.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`.
    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// Whether `a` and `b` share a set.
    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Sets with two or more members, each sorted, ordered by smallest member.
    pub fn clusters(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for x in 0..self.parent.len() {
            let root = self.find(x);
            by_root.entry(root).or_default().push(x);
        }
        let mut clusters: Vec<Vec<usize>> =
            by_root.into_values().filter(|c| c.len() > 1).collect();
        clusters.sort_by_key(|c| c[0]);
        clusters
    }
}

/// Split a hash group of `n` members into proven-equal clusters.
///
/// `equal(i, j)` is only asked about pairs not already joined, so a group of
/// `k` true duplicates costs `k - 1` comparisons. Members that end up in no
/// cluster match nothing else in the group.
///
/// # Errors
///
/// Stops at the first error returned by `equal`.
pub fn resolve_clusters<E, F>(n: usize, mut equal: F) -> Result<Vec<Vec<usize>>, E>
where
    F: FnMut(usize, usize) -> Result<bool, E>,
{
    let mut sets = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if sets.connected(i, j) {
                continue;
            }
            if equal(i, j)? {
                sets.union(i, j);
            }
        }
    }
    Ok(sets.clusters())
}

/// Index of the member to keep: shortest full path, ties broken by
/// lexicographic path order.
#[must_use]
pub fn pick_keeper(members: &[Arc<FileEntry>]) -> Option<usize> {
    members
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.path()
                .as_os_str()
                .len()
                .cmp(&b.path().as_os_str().len())
                .then_with(|| a.path().cmp(b.path()))
        })
        .map(|(i, _)| i)
}

/// A resolved duplicate group, as reported to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Group id, unique within one scan.
    pub id: u64,
    /// Shared digest.
    pub digest: Option<String>,
    /// Size of each member.
    pub size: u64,
    /// The member that stays.
    pub keep: Option<PathBuf>,
    /// Redundant members.
    pub delete: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delete.len() + usize::from(self.keep.is_some())
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes reclaimable by deleting every redundant member.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.delete.len() as u64
    }
}

/// Rebuild duplicate groups from entry snapshots, ordered by group id.
#[must_use]
pub fn collect_groups(snapshots: &[EntrySnapshot]) -> Vec<DuplicateGroup> {
    let mut groups: BTreeMap<u64, DuplicateGroup> = BTreeMap::new();
    for snap in snapshots {
        let Some(id) = snap.group else { continue };
        let group = groups.entry(id).or_insert_with(|| DuplicateGroup {
            id,
            digest: None,
            size: snap.size,
            keep: None,
            delete: Vec::new(),
        });
        if group.digest.is_none() {
            group.digest.clone_from(&snap.digest);
        }
        match snap.state {
            FileState::Keep => group.keep = Some(snap.path.clone()),
            FileState::Delete => group.delete.push(snap.path.clone()),
            _ => {}
        }
    }
    let mut groups: Vec<DuplicateGroup> = groups.into_values().collect();
    for group in &mut groups {
        group.delete.sort();
    }
    groups
}

/// Duplicate groups currently recorded in `registry`.
#[must_use]
pub fn registry_groups(registry: &FileRegistry) -> Vec<DuplicateGroup> {
    let snapshots: Vec<EntrySnapshot> = registry.entries().iter().map(|e| e.snapshot()).collect();
    collect_groups(&snapshots)
}
