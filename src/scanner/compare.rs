//! Byte-exact comparison of two files.

use std::fs::File;
use std::path::{Path, PathBuf};

use super::hasher::DEFAULT_CHUNK_SIZE;
use crate::limiter::IoContext;

/// Failures while comparing two files.
#[derive(thiserror::Error, Debug)]
pub enum CompareError {
    /// One of the files could not be opened or read.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Cancellation was observed between chunks.
    #[error("comparison cancelled")]
    Cancelled,
}

/// Compares files chunk by chunk, stopping at the first difference.
#[derive(Debug, Clone, Copy)]
pub struct ByteComparator {
    chunk_size: usize,
}

impl Default for ByteComparator {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ByteComparator {
    /// Create a comparator reading `chunk_size` bytes per side per step.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(4096),
        }
    }

    /// Whether `a` and `b` have identical contents.
    ///
    /// Each side's reads happen under its own volume gate, one chunk at a
    /// time. Files of different lengths are never equal.
    ///
    /// # Errors
    ///
    /// Returns [`CompareError::Cancelled`] when cancellation is observed and
    /// [`CompareError::Io`] if either file cannot be read.
    pub fn compare(
        &self,
        a: &Path,
        b: &Path,
        io_a: &IoContext<'_>,
        io_b: &IoContext<'_>,
    ) -> Result<bool, CompareError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| CompareError::Io { path, source }
        };

        io_a.checkpoint().map_err(|_| CompareError::Cancelled)?;
        let mut file_a = File::open(a).map_err(io_err(a))?;
        let mut file_b = File::open(b).map_err(io_err(b))?;

        let len_a = file_a.metadata().map_err(io_err(a))?.len();
        let len_b = file_b.metadata().map_err(io_err(b))?.len();
        if len_a != len_b {
            return Ok(false);
        }

        let mut buf_a = vec![0u8; self.chunk_size];
        let mut buf_b = vec![0u8; self.chunk_size];
        loop {
            io_a.checkpoint().map_err(|_| CompareError::Cancelled)?;
            let n_a = io_a.read_chunk(&mut file_a, &mut buf_a).map_err(io_err(a))?;
            let n_b = io_b.read_chunk(&mut file_b, &mut buf_b).map_err(io_err(b))?;
            if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
                return Ok(false);
            }
            if n_a < buf_a.len() {
                return Ok(true);
            }
        }
    }
}
