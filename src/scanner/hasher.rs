//! Streaming file digests.
//!
//! Files are read in fixed-size chunks and folded into the digest strictly
//! in file order. The gated variant checkpoints the run's pause gate and
//! cancellation signal before every chunk and takes the volume's read gate
//! around each individual read.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use super::HashError;
use crate::limiter::IoContext;

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;
/// Smallest configurable chunk size: 1 MiB.
pub const MIN_CHUNK_SIZE: usize = 1024 * 1024;
/// Largest configurable chunk size: 16 MiB.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Digest algorithm used to confirm candidate duplicates.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// CRC-32 (IEEE). Fast, collisions are easy to construct.
    Crc32,
    /// MD5. Collisions are practical to construct.
    Md5,
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-512.
    Sha512,
    /// BLAKE3.
    Blake3,
}

impl HashAlgorithm {
    /// Whether equal digests should be confirmed with a byte comparison
    /// before files are treated as duplicates.
    #[must_use]
    pub fn is_weak(self) -> bool {
        matches!(self, Self::Crc32 | Self::Md5)
    }

    /// Hex digest length.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Crc32 => 8,
            Self::Md5 => 32,
            Self::Sha256 | Self::Blake3 => 64,
            Self::Sha512 => 128,
        }
    }

    fn digester(self) -> Digester {
        match self {
            Self::Crc32 => Digester::Crc32(crc32fast::Hasher::new()),
            Self::Md5 => Digester::Md5(Md5::new()),
            Self::Sha256 => Digester::Sha256(Sha256::new()),
            Self::Sha512 => Digester::Sha512(Sha512::new()),
            Self::Blake3 => Digester::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Crc32 => "crc32",
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        };
        f.write_str(name)
    }
}

enum Digester {
    Crc32(crc32fast::Hasher),
    Md5(Md5),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Digester {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Crc32(h) => h.update(data),
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finish(self) -> String {
        match self {
            Self::Crc32(h) => hash_to_hex(&h.finalize().to_be_bytes()),
            Self::Md5(h) => hash_to_hex(&h.finalize()),
            Self::Sha256(h) => hash_to_hex(&h.finalize()),
            Self::Sha512(h) => hash_to_hex(&h.finalize()),
            Self::Blake3(h) => hash_to_hex(h.finalize().as_bytes()),
        }
    }
}

/// Lowercase hex encoding of a digest.
#[must_use]
pub fn hash_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Chunked streaming hasher.
#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl Hasher {
    /// Create a hasher with the default chunk size.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the chunk size, clamped to 1–16 MiB.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// Selected algorithm.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest an in-memory buffer.
    #[must_use]
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut digester = self.algorithm.digester();
        digester.update(data);
        digester.finish()
    }

    /// Digest everything `reader` yields.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<String> {
        let mut digester = self.algorithm.digester();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            digester.update(&buf[..n]);
        }
        Ok(digester.finish())
    }

    /// Digest a file without any gating.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn hash_file(&self, path: &Path) -> Result<String, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path.to_path_buf(), e))?;
        self.hash_reader(file)
            .map_err(|e| HashError::from_io(path.to_path_buf(), e))
    }

    /// Digest a file under a run's pause gate and a volume's read gate.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Cancelled`] when cancellation is observed between
    /// chunks, otherwise [`HashError`] for open or read failures.
    pub fn hash_file_gated(&self, path: &Path, io: &IoContext<'_>) -> Result<String, HashError> {
        let cancelled = || HashError::Cancelled(path.to_path_buf());

        io.checkpoint().map_err(|_| cancelled())?;
        let mut file = File::open(path).map_err(|e| HashError::from_io(path.to_path_buf(), e))?;
        let mut digester = self.algorithm.digester();
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            io.checkpoint().map_err(|_| cancelled())?;
            let n = io
                .read_chunk(&mut file, &mut buf)
                .map_err(|e| HashError::from_io(path.to_path_buf(), e))?;
            digester.update(&buf[..n]);
            if n < buf.len() {
                break;
            }
        }

        io.checkpoint().map_err(|_| cancelled())?;
        Ok(digester.finish())
    }
}
