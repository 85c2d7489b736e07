//! Command-line interface definitions for dupsweep.
//!
//! # Example
//!
//! ```bash
//! # Scan two trees and print a summary
//! dupsweep scan ~/Pictures /mnt/backup/Pictures
//!
//! # Weak but fast digest, confirmed byte by byte, JSON report
//! dupsweep scan ~/Downloads --algorithm crc32 --verify --report json
//!
//! # Move every redundant copy to the trash
//! dupsweep scan ~/Downloads --delete
//!
//! # Show the effective configuration
//! dupsweep config show
//! ```

use std::path::PathBuf;

use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::scanner::HashAlgorithm;

/// Find duplicate files across folders and reclaim the space.
#[derive(Debug, Parser)]
#[command(name = "dupsweep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file to use instead of the platform default
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan folders for duplicate files
    Scan(ScanArgs),
    /// Inspect or write the configuration file
    Config(ConfigArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Folders to scan. Folders may not be nested inside one another.
    #[arg(value_name = "FOLDER", required = true)]
    pub folders: Vec<PathBuf>,

    /// Digest algorithm
    #[arg(short, long, value_enum)]
    pub algorithm: Option<HashAlgorithm>,

    /// Confirm every hash match with a byte-by-byte comparison
    #[arg(long)]
    pub verify: bool,

    /// Worker threads (default: one per core)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Files read concurrently per volume
    #[arg(long, value_name = "N")]
    pub per_volume: Option<usize>,

    /// Read buffer size, 1 MiB to 16 MiB (e.g. 8MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Allow concurrent reads on the same volume
    #[arg(long)]
    pub parallel_reads: bool,

    /// Minimum file size to consider (e.g., 1KB, 1MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size to consider (e.g., 1GB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Gitignore-style patterns to skip (can be repeated)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links during scan
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Include zero-byte files
    #[arg(long)]
    pub include_empty: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub report: ReportFormat,

    /// Move every file marked for deletion to the trash after the scan
    #[arg(long, conflicts_with = "copy_to")]
    pub delete: bool,

    /// Copy one copy of every distinct file under DIR after the scan
    #[arg(long, value_name = "DIR")]
    pub copy_to: Option<PathBuf>,
}

impl ScanArgs {
    /// Apply these flags on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(algorithm) = self.algorithm {
            config.algorithm = algorithm;
        }
        config.verify |= self.verify;
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(per_volume) = self.per_volume {
            config.per_volume_in_flight = per_volume;
        }
        if let Some(chunk) = self.chunk_size {
            config.chunk_size = usize::try_from(chunk).unwrap_or(usize::MAX);
        }
        if self.parallel_reads {
            config.serialize_volume_reads = false;
        }
        if self.min_size.is_some() {
            config.min_size = self.min_size;
        }
        if self.max_size.is_some() {
            config.max_size = self.max_size;
        }
        config.follow_symlinks |= self.follow_symlinks;
        config.skip_hidden |= self.skip_hidden;
        if self.include_empty {
            config.skip_empty = false;
        }
        config
            .ignore_patterns
            .extend(self.ignore_patterns.iter().cloned());
    }
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// What to do
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the effective configuration to the config file
    Save,
    /// Print the default config file location
    Path,
}

/// Report format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary
    Text,
    /// Summary and groups as JSON
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Text => write!(f, "text"),
            ReportFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Decimal (`KB`, `MB`, ...) and binary (`KiB`, `MiB`, ...) suffixes are
/// accepted, case-insensitively. Plain numbers are bytes.
///
/// # Examples
///
/// ```
/// use dupsweep::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty or not a size.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    s.parse::<ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|e| format!("Invalid size '{s}': {e}"))
}
