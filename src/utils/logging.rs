//! Structured logging initialization.
//!
//! Builds the global `tracing` subscriber from [`LoggingConfig`]. Safe to
//! call once per process; a second call reports a configuration error
//! instead of panicking.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Install the global subscriber described by `config`.
///
/// Console output is the default. When `log_to_file` is set, output goes to
/// the configured file instead. `json_format` switches the console format
/// to newline-delimited JSON.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::Config("log_file_path required when log_to_file is set".into())
        })?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtocolError::Config(format!("failed to open log file: {e}")))?;

        return tracing_subscriber::fmt()
            .with_max_level(config.log_level)
            .with_ansi(false)
            .with_writer(file)
            .try_init()
            .map_err(|e| ProtocolError::Config(format!("failed to install subscriber: {e}")));
    }

    if config.json_format {
        tracing_subscriber::fmt()
            .with_max_level(config.log_level)
            .json()
            .try_init()
            .map_err(|e| ProtocolError::Config(format!("failed to install subscriber: {e}")))
    } else {
        tracing_subscriber::fmt()
            .with_max_level(config.log_level)
            .try_init()
            .map_err(|e| ProtocolError::Config(format!("failed to install subscriber: {e}")))
    }
}
