//! Copy entries under a destination folder.
//!
//! Each file keeps its position relative to the root it was found under:
//! `/photos/2020/a.jpg` from root `/photos` lands at `<dest>/2020/a.jpg`.
//! Missing directories are created and existing files are overwritten.
//! Reads go through the source volume's gate one chunk at a time, so a copy
//! can be paused or cancelled mid-file; a cancelled copy removes its partial
//! output.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use super::{BatchResult, Outcome};
use crate::control::RunContext;
use crate::limiter::{IoContext, ResourceLimiter};
use crate::registry::FileEntry;
use crate::scanner::path_utils::{paths_equal, relative_to};
use crate::scanner::DEFAULT_CHUNK_SIZE;

/// Per-file copy failures.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The entry lies under none of the given roots.
    #[error("{0} is not under any scanned folder")]
    OutsideRoots(PathBuf),

    /// Source and target are the same file.
    #[error("refusing to copy {0} onto itself")]
    SameFile(PathBuf),

    /// Reading the source failed.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Source file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Creating or writing the target failed.
    #[error("cannot write {path}: {source}")]
    Write {
        /// Target file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Cancellation was observed mid-file.
    #[error("copy cancelled")]
    Cancelled,
}

/// Where `path` should land under `destination`, given the scanned roots.
#[must_use]
pub fn target_path(path: &Path, roots: &[PathBuf], destination: &Path) -> Option<PathBuf> {
    roots
        .iter()
        .find_map(|root| relative_to(path, root))
        .map(|relative| destination.join(relative))
}

/// Copy `source` to `target` chunk by chunk. Returns bytes written.
///
/// # Errors
///
/// [`CopyError::Cancelled`] after removing the partial target, otherwise a
/// read or write failure.
pub fn copy_file(
    source: &Path,
    target: &Path,
    io: &IoContext<'_>,
    chunk_size: usize,
) -> Result<u64, CopyError> {
    let read_err = |e: io::Error| CopyError::Read {
        path: source.to_path_buf(),
        source: e,
    };
    let write_err = |e: io::Error| CopyError::Write {
        path: target.to_path_buf(),
        source: e,
    };

    io.checkpoint().map_err(|_| CopyError::Cancelled)?;
    if paths_equal(source, target) {
        return Err(CopyError::SameFile(source.to_path_buf()));
    }
    let mut input = File::open(source).map_err(read_err)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut output = File::create(target).map_err(write_err)?;

    let result = pump(&mut input, &mut output, io, chunk_size, read_err, write_err);
    if result.is_err() {
        drop(output);
        if let Err(e) = fs::remove_file(target) {
            log::debug!("Could not remove partial copy {}: {}", target.display(), e);
        }
    }
    result
}

fn pump(
    input: &mut File,
    output: &mut File,
    io: &IoContext<'_>,
    chunk_size: usize,
    read_err: impl Fn(io::Error) -> CopyError,
    write_err: impl Fn(io::Error) -> CopyError,
) -> Result<u64, CopyError> {
    let mut buf = vec![0u8; chunk_size.max(4096)];
    let mut written = 0u64;
    loop {
        io.checkpoint().map_err(|_| CopyError::Cancelled)?;
        let n = io.read_chunk(input, &mut buf).map_err(&read_err)?;
        output.write_all(&buf[..n]).map_err(&write_err)?;
        written += n as u64;
        if n < buf.len() {
            break;
        }
    }
    output.flush().map_err(&write_err)?;
    Ok(written)
}

/// Copy every entry under `destination`, soft-failing per file.
///
/// Entry states are not changed by copying.
pub fn copy_entries(
    entries: &[Arc<FileEntry>],
    roots: &[PathBuf],
    destination: &Path,
    limiter: &ResourceLimiter,
    run: &RunContext,
) -> BatchResult {
    let progress = run.progress();
    progress.begin_step(0, "copy");
    progress.set_total(entries.iter().map(|e| e.size()).sum());
    log::info!("Copying {} files to {}", entries.len(), destination.display());

    let signals = run.signals().as_ref();
    let outcomes: Vec<Outcome> = limiter.install(|| {
        entries
            .par_iter()
            .map(|entry| {
                if run.checkpoint().is_err() {
                    return Outcome::Skipped;
                }
                let source = entry.path();
                let Some(target) = target_path(source, roots, destination) else {
                    let e = CopyError::OutsideRoots(source.to_path_buf());
                    log::warn!("{e}");
                    return Outcome::Failed(source.to_path_buf(), e.to_string());
                };

                let gates = limiter.volume(entry.volume());
                let _permit = gates.admit();
                let io = IoContext::new(signals, &gates).with_progress(progress);
                match copy_file(source, &target, &io, DEFAULT_CHUNK_SIZE) {
                    Ok(bytes) => {
                        log::debug!("Copied {} -> {}", source.display(), target.display());
                        Outcome::Done(bytes)
                    }
                    Err(CopyError::Cancelled) => Outcome::Skipped,
                    Err(e) => {
                        log::warn!("Copy failed for {}: {}", source.display(), e);
                        Outcome::Failed(source.to_path_buf(), e.to_string())
                    }
                }
            })
            .collect()
    });

    let result = BatchResult::from_outcomes(outcomes);
    log::info!("Copy finished: {}", result.summary());
    result
}
