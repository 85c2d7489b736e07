use std::fs;
use std::path::Path;

use dupsweep::config::Config;
use dupsweep::scanner::HashAlgorithm;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::{Figment, Jail};
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Figment without Env, so variables set by other tests cannot leak in.
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
    assert!(config.serialize_volume_reads);
    assert!(config.skip_empty);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
algorithm = "md5"
verify = true
per_volume_in_flight = 2
chunk_size = 8388608
follow_symlinks = true
min_size = 4096
ignore_patterns = ["*.tmp", "node_modules/"]
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();

    assert_eq!(config.algorithm, HashAlgorithm::Md5);
    assert!(config.verify);
    assert_eq!(config.per_volume_in_flight, 2);
    assert_eq!(config.chunk_size, 8 * 1024 * 1024);
    assert!(config.follow_symlinks);
    assert_eq!(config.min_size, Some(4096));
    assert_eq!(config.max_size, None);
    assert_eq!(config.ignore_patterns.len(), 2);

    let walker = config.walker_config();
    assert_eq!(walker.min_size, Some(4096));
    assert!(walker.follow_symlinks);
}

#[test]
fn test_env_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "algorithm = \"sha512\"\nthreads = 2\n")?;
        jail.set_env("DUPSWEEP_ALGORITHM", "blake3");
        jail.set_env("DUPSWEEP_VERIFY", "true");

        let config = Config::load(Some(Path::new("config.toml")))
            .map_err(|e| figment::Error::from(e.to_string()))?;
        assert_eq!(config.algorithm, HashAlgorithm::Blake3);
        assert!(config.verify);
        assert_eq!(config.threads, 2);
        Ok(())
    });
}

#[test]
fn test_env_only() {
    Jail::expect_with(|jail| {
        jail.set_env("DUPSWEEP_SKIP_HIDDEN", "true");
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("DUPSWEEP_"))
            .extract()?;
        assert!(config.skip_hidden);
        Ok(())
    });
}

#[test]
fn test_config_save_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("nested/dir/config.toml");

    let config = Config {
        algorithm: HashAlgorithm::Crc32,
        per_volume_in_flight: 1,
        ignore_patterns: vec!["*.bak".to_string()],
        ..Config::default()
    };
    let written = config.save(Some(&config_path)).unwrap();
    assert_eq!(written, config_path);

    let saved = fs::read_to_string(&config_path).unwrap();
    assert!(saved.contains("algorithm = \"crc32\""));
    assert!(saved.contains("per_volume_in_flight = 1"));
    assert!(saved.contains("\"*.bak\""));
}

#[test]
fn test_config_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "invalid = toml").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract();
    assert!(result.is_err());
}

#[test]
fn test_unknown_algorithm_rejected() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "algorithm = \"sha1\"").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract();
    assert!(result.is_err());
}
