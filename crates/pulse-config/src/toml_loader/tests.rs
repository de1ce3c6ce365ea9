//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::{PulseConfig, StoreBackend};
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_parse_error() {
    let result = load_from_path(Path::new("/tmp/nonexistent_pulse_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, pulse_common::ConfigError::ParseError(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[presence]
heartbeat_interval = 45

[transport]
poll_interval = 15
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.presence.heartbeat_interval, 45);
    assert_eq!(config.transport.poll_interval, 15);
    // Defaults preserved
    assert_eq!(config.presence.inactivity_window, 300);
    assert_eq!(config.store.backend, StoreBackend::Memory);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, pulse_common::ConfigError::ParseError(_)));
}

#[test]
fn load_config_with_invalid_values_is_returned_as_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[presence]\ninactivity_window = 5\n").unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.presence.inactivity_window, 5);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.transport.retry_max, 300);
}

#[test]
fn default_config_toml_is_valid() {
    use super::template::default_config_toml;

    let config: PulseConfig = toml::from_str(default_config_toml()).unwrap();
    assert!(crate::validation::validate(&config).is_ok());
}

#[test]
fn default_config_path_is_reasonable() {
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("pulse"));
        assert!(path_str.ends_with("config.toml"));
    }
}
