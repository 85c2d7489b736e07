//! Duplicate detection.
//!
//! - [`groups`]: size/volume/digest partitioning, union-find, keeper choice
//! - [`finder`]: the scan pipeline driving the registry to a classification

pub mod finder;
pub mod groups;

pub use finder::{DuplicateFinder, FinderConfig, FinderError, ScanSummary, SCAN_STEPS};
pub use groups::{
    collect_groups, group_by_digest, group_by_volume, partition_by_size, pick_keeper,
    registry_groups, resolve_clusters, DuplicateGroup, SizePartition, UnionFind,
};
