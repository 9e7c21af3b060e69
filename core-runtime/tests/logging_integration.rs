//! Integration tests for logging and configuration

use bridge_traits::time::LogLevel;
use core_runtime::config::{ClientConfig, FileConfig, RetentionSetting};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::io::Write;

#[test]
fn test_logging_initialization_once() {
    // A subscriber can only be installed once per process
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());

    tracing::info!(device = "0042", "logging initialized");
}

#[test]
fn test_config_file_and_identity_file_together() {
    let dir = tempfile::tempdir().unwrap();

    let identity_path = dir.path().join("pharmacy.json");
    let mut identity = std::fs::File::create(&identity_path).unwrap();
    write!(identity, r#"{{"ANF": "0815"}}"#).unwrap();

    let config_path = dir.path().join("piradio.toml");
    let mut config_file = std::fs::File::create(&config_path).unwrap();
    writeln!(
        config_file,
        "identity_file = {:?}\n\n[cache]\nroot = {:?}\nhard_ceiling_bytes = 6000000000\nretention = \"calendar_month\"",
        identity_path.display().to_string(),
        dir.path().join("cache").display().to_string(),
    )
    .unwrap();

    let file = FileConfig::load(&config_path).unwrap();
    let config = ClientConfig::builder()
        .with_file_config(file)
        .build()
        .unwrap();

    assert_eq!(config.device_id, "0815");
    assert_eq!(config.cache.root, dir.path().join("cache"));
    assert_eq!(config.cache.hard_ceiling_bytes, Some(6_000_000_000));
    assert_eq!(config.cache.retention, RetentionSetting::CalendarMonth);
}

#[test]
fn test_missing_config_file_reports_path() {
    let err = FileConfig::load("/nonexistent/piradio.toml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/piradio.toml"));
}
