use std::fs;
use std::time::Duration;

use placement_config::{
    CONFIG_JSON_ENV, CONFIG_PATH_ENV, OperatorConfigSource, load_from_file, load_from_lookup,
};
use placement_core::operator::OperatorConfig;
use tempfile::TempDir;

const EXAMPLE: &str = include_str!("../config/operator.example.toml");

#[test]
fn test_example_config_matches_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("operator.toml");
    fs::write(&path, EXAMPLE).unwrap();

    let config = load_from_file(&path).unwrap();
    assert_eq!(config, OperatorConfig::default());
}

#[test]
fn test_json_file_with_partial_overrides() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("operator.json");
    fs::write(&path, r#"{"step_cost":{"slow_step_wait":"20m"}}"#).unwrap();

    let config = load_from_file(&path).unwrap();
    assert_eq!(config.step_cost.slow_step_wait, Duration::from_secs(20 * 60));
    assert_eq!(config.expire_after, Duration::from_secs(3));
}

#[test]
fn test_unknown_extension_sniffs_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("operator.conf");
    fs::write(&path, "expire_after = \"10s\"\n").unwrap();

    let config = load_from_file(&path).unwrap();
    assert_eq!(config.expire_after, Duration::from_secs(10));
}

#[test]
fn test_env_path_wins_over_inline_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("operator.toml");
    fs::write(&path, "expire_after = \"7s\"\n").unwrap();
    let path_str = path.display().to_string();

    let (config, source) = load_from_lookup(|key| match key {
        CONFIG_PATH_ENV => Some(path_str.clone()),
        CONFIG_JSON_ENV => Some(r#"{"expire_after":"1s"}"#.to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(source, OperatorConfigSource::EnvPath(path));
    assert_eq!(config.expire_after, Duration::from_secs(7));
}

#[test]
fn test_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let err = load_from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.toml"));
}

#[test]
fn test_malformed_toml_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("operator.toml");
    fs::write(&path, "expire_after = [\n").unwrap();

    assert!(load_from_file(&path).is_err());
}
