//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. built-in defaults
//! 2. `config.toml` in the platform config directory, or an explicit file
//! 3. `DUPSWEEP_*` environment variables (e.g. `DUPSWEEP_ALGORITHM=blake3`)
//!
//! Command-line flags are applied on top by the caller.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::FinderConfig;
use crate::limiter::{LimiterConfig, DEFAULT_PER_VOLUME_IN_FLIGHT};
use crate::scanner::{HashAlgorithm, WalkerConfig, DEFAULT_CHUNK_SIZE};
use crate::workspace::WorkspaceConfig;

/// Prefix of environment variables read by [`Config::figment`].
pub const ENV_PREFIX: &str = "DUPSWEEP_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Digest algorithm.
    pub algorithm: HashAlgorithm,
    /// Byte-compare files inside each hash group.
    pub verify: bool,
    /// Worker threads. `0` means one per logical core.
    pub threads: usize,
    /// Files per volume read concurrently.
    pub per_volume_in_flight: usize,
    /// Read buffer size in bytes.
    pub chunk_size: usize,
    /// One outstanding read or delete per volume.
    pub serialize_volume_reads: bool,
    /// Skip dot-files and dot-directories.
    pub skip_hidden: bool,
    /// Skip zero-byte files.
    pub skip_empty: bool,
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Smallest file size considered, in bytes.
    pub min_size: Option<u64>,
    /// Largest file size considered, in bytes.
    pub max_size: Option<u64>,
    /// Gitignore-style patterns to skip.
    pub ignore_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            verify: false,
            threads: 0,
            per_volume_in_flight: DEFAULT_PER_VOLUME_IN_FLIGHT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            serialize_volume_reads: true,
            skip_hidden: false,
            skip_empty: true,
            follow_symlinks: false,
            min_size: None,
            max_size: None,
            ignore_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// The layered provider chain. `explicit` replaces the default file.
    #[must_use]
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        match explicit {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                if let Some(path) = Self::config_path() {
                    figment = figment.merge(Toml::file(path));
                }
            }
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Fails if a file or variable cannot be parsed, or if an explicit file
    /// does not exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
        }
        let config: Self = Self::figment(explicit)
            .extract()
            .context("invalid configuration")?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Write the configuration as TOML. Returns the path written.
    ///
    /// # Errors
    ///
    /// Fails if no config directory is known or the file cannot be written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()
                .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).with_context(|| format!("cannot write {}", path.display()))?;
        log::info!("Saved configuration to {}", path.display());
        Ok(path)
    }

    /// Default platform-specific configuration file.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "dupsweep", "dupsweep")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Enumeration filters implied by this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::default()
            .with_skip_hidden(self.skip_hidden)
            .with_skip_empty(self.skip_empty)
            .with_follow_symlinks(self.follow_symlinks)
            .with_min_size(self.min_size)
            .with_max_size(self.max_size)
            .with_ignore_patterns(self.ignore_patterns.clone())
    }

    /// Everything a [`Workspace`](crate::workspace::Workspace) needs.
    #[must_use]
    pub fn workspace_config(&self) -> WorkspaceConfig {
        WorkspaceConfig {
            finder: FinderConfig::default()
                .with_algorithm(self.algorithm)
                .with_verify(self.verify)
                .with_chunk_size(self.chunk_size)
                .with_walker(self.walker_config()),
            limiter: LimiterConfig::default()
                .with_workers(self.threads)
                .with_per_volume_in_flight(self.per_volume_in_flight)
                .with_serialize_reads(self.serialize_volume_reads),
        }
    }
}
