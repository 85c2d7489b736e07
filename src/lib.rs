//! dupsweep - find duplicate files across folders and reclaim the space.
//!
//! The core is a library: a [`workspace::Workspace`] holds a set of
//! non-overlapping folders, scans them on a background thread through a
//! size/hash/compare pipeline, classifies every file as `unique`, `keep` or
//! `delete`, and can move redundant copies to the trash or copy a
//! deduplicated tree elsewhere. Every operation can be paused, resumed and
//! cancelled, and file I/O is throttled per storage volume.
//!
//! The `dupsweep` binary is a thin CLI over the same facade.

pub mod actions;
pub mod app;
pub mod cli;
pub mod config;
pub mod control;
pub mod duplicates;
pub mod error;
pub mod folders;
pub mod limiter;
pub mod logging;
pub mod progress;
pub mod registry;
pub mod report;
pub mod scanner;
pub mod signal;
pub mod workspace;

pub use app::run_app;
