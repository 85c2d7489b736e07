//! Layering tests: command-line flags on top of the file and environment.

use clap::Parser;
use dupsweep::cli::{Cli, Commands, ScanArgs};
use dupsweep::config::Config;
use dupsweep::scanner::HashAlgorithm;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use tempfile::tempdir;

fn scan_args(args: &[&str]) -> ScanArgs {
    let mut argv = vec!["dupsweep", "scan"];
    argv.extend_from_slice(args);
    match Cli::try_parse_from(argv).unwrap().command {
        Commands::Scan(args) => args,
        other => panic!("expected scan, got {other:?}"),
    }
}

fn from_toml(content: &str) -> Config {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap()
}

#[test]
fn test_flags_override_file_values() {
    let mut config = from_toml("algorithm = \"md5\"\nthreads = 2\nper_volume_in_flight = 1\n");
    scan_args(&["-a", "sha256", "-j", "6", "/tmp/x"]).apply_to(&mut config);

    assert_eq!(config.algorithm, HashAlgorithm::Sha256);
    assert_eq!(config.threads, 6);
    // Not given on the command line, so the file wins.
    assert_eq!(config.per_volume_in_flight, 1);
}

#[test]
fn test_absent_flags_keep_file_values() {
    let mut config = from_toml("verify = true\nfollow_symlinks = true\nmin_size = 10\n");
    let before = config.clone();
    scan_args(&["/tmp/x"]).apply_to(&mut config);
    assert_eq!(config, before);
}

#[test]
fn test_size_flags_accept_units() {
    let mut config = Config::default();
    scan_args(&["--min-size", "1KiB", "--max-size", "2MB", "--chunk-size", "64KiB", "/tmp/x"])
        .apply_to(&mut config);

    assert_eq!(config.min_size, Some(1024));
    assert_eq!(config.max_size, Some(2_000_000));
    assert_eq!(config.chunk_size, 64 * 1024);
}

#[test]
fn test_ignore_patterns_accumulate() {
    let mut config = from_toml("ignore_patterns = [\"*.tmp\"]\n");
    scan_args(&["-i", "*.bak", "--ignore", "target/", "/tmp/x"]).apply_to(&mut config);
    assert_eq!(config.ignore_patterns, vec!["*.tmp", "*.bak", "target/"]);
}

#[test]
fn test_boolean_flags_only_switch_on() {
    let mut config = Config::default();
    assert!(config.skip_empty);
    assert!(config.serialize_volume_reads);

    scan_args(&["--include-empty", "--parallel-reads", "--skip-hidden", "--verify", "/tmp/x"])
        .apply_to(&mut config);
    assert!(!config.skip_empty);
    assert!(!config.serialize_volume_reads);
    assert!(config.skip_hidden);
    assert!(config.verify);
}

#[test]
fn test_workspace_config_reflects_layers() {
    let mut config = from_toml("algorithm = \"crc32\"\nskip_hidden = true\n");
    scan_args(&["--verify", "--per-volume", "3", "/tmp/x"]).apply_to(&mut config);

    let workspace = config.workspace_config();
    assert_eq!(workspace.finder.algorithm, HashAlgorithm::Crc32);
    assert!(workspace.finder.verify);
    assert!(workspace.finder.walker.skip_hidden);
    assert_eq!(workspace.limiter.per_volume_in_flight, 3);
}

#[test]
fn test_delete_and_copy_conflict() {
    let result = Cli::try_parse_from(["dupsweep", "scan", "--delete", "--copy-to", "/out", "/tmp/x"]);
    assert!(result.is_err());
}
