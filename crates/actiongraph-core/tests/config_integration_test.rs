use actiongraph_core::{GraphConfig, GraphError};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_without_file_uses_defaults() {
    let config = GraphConfig::load(None).unwrap();
    assert_eq!(config.events.channel_capacity, 1024);
    assert_eq!(config.logging.format, "pretty");
}

#[test]
fn test_load_from_toml_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("graph.toml");
    fs::write(
        &path,
        r#"
[logging]
level = "debug"
format = "compact"

[events]
channel_capacity = 64
"#,
    )
    .unwrap();

    let config = GraphConfig::load(Some(&path)).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "compact");
    assert_eq!(config.events.channel_capacity, 64);
}

#[test]
fn test_missing_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let err = GraphConfig::load(Some(&tmp.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, GraphError::Config(_)));
}

#[test]
fn test_invalid_format_in_file_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("graph.toml");
    fs::write(&path, "[logging]\nformat = \"xml\"\n").unwrap();
    assert!(GraphConfig::load(Some(&path)).is_err());
}

#[test]
fn test_environment_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("graph.toml");
    fs::write(&path, "[events]\nchannel_capacity = 64\n").unwrap();

    let env: config::Map<String, String> = [
        ("ACTIONGRAPH__EVENTS__BROADCAST", "false"),
        ("ACTIONGRAPH__EVENTS__CHANNEL_CAPACITY", "8"),
        ("UNRELATED__EVENTS__BROADCAST", "true"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let config = GraphConfig::load_with_env(Some(&path), Some(env)).unwrap();
    assert!(!config.events.broadcast);
    assert_eq!(config.events.channel_capacity, 8);
    assert_eq!(config.logging.level, "info");
}
