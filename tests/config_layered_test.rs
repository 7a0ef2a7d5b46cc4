//! Configuration files on disk and `CRABSTREAM_*` environment overrides.

use crabstream::config::EngineConfig;
use crabstream::{Capability, DeliveryError};
use std::fs;
use tempfile::tempdir;

const CUSTOM_CONFIG: &str = r#"
[[strategies]]
name = "hls"
priority = 1
timeout_ms = 3000
max_retries = 2
required_capabilities = ["hls_native"]

[[strategies]]
name = "direct"
priority = 2
timeout_ms = 5000
max_retries = 3
required_capabilities = ["video_element"]

[metrics]
alpha = 0.2
history_size = 10

[selector]
lightweight_order = ["direct", "hls"]

[executor]
base_backoff_ms = 100
"#;

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("crabstream.toml");

    let mut config = EngineConfig::default();
    config.metrics.history_size = 64;
    config.executor.max_backoff_ms = 2_000;
    config.save_to_file(&path).unwrap();

    let loaded = EngineConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.metrics.history_size, 64);
    assert_eq!(loaded.executor.max_backoff_ms, 2_000);
    assert_eq!(loaded.strategies, config.strategies);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crabstream.toml");
    fs::write(&path, CUSTOM_CONFIG).unwrap();

    let config = EngineConfig::load_from_file(&path).unwrap();
    assert_eq!(config.strategies.len(), 2);
    assert!(config.strategies[0]
        .required_capabilities
        .contains(&Capability::HlsNative));
    assert_eq!(config.metrics.alpha, 0.2);
    assert_eq!(config.metrics.snapshot_window, 20);
    assert_eq!(config.selector.success_weight, 0.7);
    assert_eq!(config.executor.base_backoff_ms, 100);
    assert_eq!(config.executor.max_backoff_ms, 10_000);
    assert!(config.validate().is_ok());
}

#[test]
fn test_malformed_file_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[metrics\nalpha = ").unwrap();

    let err = EngineConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, DeliveryError::Configuration(_)));
}

#[test]
fn test_file_then_environment_layering() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crabstream.toml");
    fs::write(&path, CUSTOM_CONFIG).unwrap();

    // Only this test touches CRABSTREAM_* variables
    let file_only = EngineConfig::load_layered(&path).unwrap();
    assert_eq!(file_only.metrics.alpha, 0.2);
    assert_eq!(file_only.strategies[0].name, "hls");

    std::env::set_var("CRABSTREAM_METRICS__ALPHA", "0.5");
    std::env::set_var("CRABSTREAM_EXECUTOR__MAX_BACKOFF_MS", "750");
    let layered = EngineConfig::load_layered(&path);
    std::env::remove_var("CRABSTREAM_METRICS__ALPHA");
    std::env::remove_var("CRABSTREAM_EXECUTOR__MAX_BACKOFF_MS");

    let layered = layered.unwrap();
    assert_eq!(layered.metrics.alpha, 0.5);
    assert_eq!(layered.metrics.history_size, 10);
    assert_eq!(layered.executor.max_backoff_ms, 750);
    assert_eq!(layered.executor.base_backoff_ms, 100);
    assert_eq!(layered.strategies.len(), 2);
    assert!(layered.validate().is_ok());

    std::env::set_var("CRABSTREAM_METRICS__HISTORY_SIZE", "9223372036854775807");
    let oversized = EngineConfig::load_layered(&path);
    std::env::remove_var("CRABSTREAM_METRICS__HISTORY_SIZE");
    let oversized = oversized.unwrap();
    assert_eq!(oversized.metrics.history_size, 9_223_372_036_854_775_807);
    assert!(oversized.validate().unwrap_err().contains("History size"));

    let missing = EngineConfig::load_layered(dir.path().join("absent.toml")).unwrap();
    assert_eq!(missing.strategies, EngineConfig::default().strategies);
}
