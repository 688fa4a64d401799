//! Integration tests for config path resolution and graceful degradation
//!
//! Tests that manipulate PROSPECT_CONFIG are marked #[serial] so they never
//! race on the process environment.

use prospect_common::config::{load_toml, resolve_config_path, LoggingConfig};
use prospect_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    env::set_var("PROSPECT_CONFIG", "/etc/prospect/custom.toml");
    let path = resolve_config_path(None, "PROSPECT_CONFIG");
    env::remove_var("PROSPECT_CONFIG");

    assert_eq!(path, Some(PathBuf::from("/etc/prospect/custom.toml")));
}

#[test]
#[serial]
fn test_cli_arg_overrides_env_var() {
    env::set_var("PROSPECT_CONFIG", "/etc/prospect/custom.toml");
    let cli = PathBuf::from("/opt/override.toml");
    let path = resolve_config_path(Some(&cli), "PROSPECT_CONFIG");
    env::remove_var("PROSPECT_CONFIG");

    assert_eq!(path, Some(cli));
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var("PROSPECT_CONFIG", "   ");
    let path = resolve_config_path(None, "PROSPECT_CONFIG");
    env::remove_var("PROSPECT_CONFIG");

    // Falls through to the user config dir, which only counts if it exists
    if let Some(p) = path {
        assert!(p.exists());
    }
}

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let config: LoggingConfig = load_toml(Some(&missing)).unwrap();
    assert_eq!(config, LoggingConfig::default());
}

#[test]
fn test_existing_file_values_loaded() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "level = \"prospect_fusion=debug\"\nansi = false\n").unwrap();

    let loaded: LoggingConfig = load_toml(Some(&path)).unwrap();
    assert_eq!(
        loaded,
        LoggingConfig {
            level: "prospect_fusion=debug".to_string(),
            ansi: false,
        }
    );
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "level = [unterminated").unwrap();

    let result: Result<LoggingConfig, Error> = load_toml(Some(&path));
    assert!(matches!(result, Err(Error::Config(_))));
}
