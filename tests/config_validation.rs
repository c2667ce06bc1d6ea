//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use ecg_transport::config::{ExchangeConfig, TransportKind};
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = ExchangeConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_invalid_server_address() {
    let mut config = ExchangeConfig::default();
    config.server.address = "invalid_address".to_string();

    let errors = config.validate();
    assert!(!errors.is_empty(), "Should have validation errors");
    assert!(errors.iter().any(|e| e.contains("Invalid server address")));
}

#[test]
fn test_empty_server_address() {
    let mut config = ExchangeConfig::default();
    config.server.address = String::new();

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_invalid_http_address() {
    let mut config = ExchangeConfig::default();
    config.server.http_address = "not-a-socket-addr".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid HTTP address")));
}

#[test]
fn test_connection_timeout_bounds() {
    let mut config = ExchangeConfig::default();
    config.server.connection_timeout = Duration::from_millis(50);

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Connection timeout too short")));

    config.server.connection_timeout = Duration::from_secs(600);
    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Connection timeout too long")));
}

#[test]
fn test_zero_max_connections() {
    let mut config = ExchangeConfig::default();
    config.server.max_connections = 0;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max connections")));
}

#[test]
fn test_client_address_needs_port() {
    let mut config = ExchangeConfig::default();
    config.client.server_address = "example.com".to_string();

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Invalid client server address")));
}

#[test]
fn test_http_base_url_scheme() {
    let mut config = ExchangeConfig::default();
    config.client.http_base_url = "ftp://example.com".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("must start with http://")));
}

#[test]
fn test_logging_requires_an_output() {
    let mut config = ExchangeConfig::default();
    config.logging.log_to_console = false;
    config.logging.log_to_file = false;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_log_file_path_required_when_logging_to_file() {
    let mut config = ExchangeConfig::default();
    config.logging.log_to_file = true;
    config.logging.log_file_path = None;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_validate_strict_rejects_invalid() {
    let mut config = ExchangeConfig::default();
    config.server.address = String::new();

    assert!(config.validate_strict().is_err());
    assert!(ExchangeConfig::default().validate_strict().is_ok());
}

#[test]
fn test_example_config_round_trips() {
    let example = ExchangeConfig::example_config();
    let parsed = ExchangeConfig::from_toml(&example).expect("example config should parse");
    assert!(parsed.validate().is_empty());
}

#[test]
fn test_from_toml_overrides() {
    let toml = r#"
        [server]
        address = "0.0.0.0:2575"
        staging_dir = "inbound"

        [client]
        transport = "http"
        http_base_url = "http://ecg.example.org:8000"

        [security]
        key_derivation = "legacy-truncate"
        binary_encoding = "hex"

        [logging]
        log_level = "debug"
    "#;

    let config = ExchangeConfig::from_toml(toml).expect("should parse");
    assert_eq!(config.server.address, "0.0.0.0:2575");
    assert_eq!(config.client.transport, TransportKind::Http);
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.validate().is_empty());
}

#[test]
fn test_from_toml_rejects_garbage() {
    assert!(ExchangeConfig::from_toml("not = [valid").is_err());
}

#[test]
fn test_default_with_overrides() {
    let config = ExchangeConfig::default_with_overrides(|c| {
        c.client.response_timeout = Duration::from_secs(30);
        c.client.transport = TransportKind::Http;
    });

    assert_eq!(config.client.response_timeout, Duration::from_secs(30));
    assert_eq!(config.client.transport, TransportKind::Http);
    assert_eq!(config.server.address, "127.0.0.1:2575");
}

#[test]
fn test_save_and_reload() {
    let path = std::env::temp_dir().join(format!(
        "ecg-transport-config-{}.toml",
        std::process::id()
    ));

    let config = ExchangeConfig::default_with_overrides(|c| {
        c.client.server_address = "10.0.0.1:2575".to_string();
    });
    config.save_to_file(&path).expect("should save");

    let reloaded = ExchangeConfig::from_file(&path).expect("should reload");
    assert_eq!(reloaded.client.server_address, "10.0.0.1:2575");

    let _ = std::fs::remove_file(&path);
}
