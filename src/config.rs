//! # Configuration Management
//!
//! Centralized configuration for the secure ECG transport.
//!
//! This module provides structured configuration for the receiver and
//! sender sides, including addresses, timeouts, staging locations, and
//! security options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults
//!
//! ## Security Considerations
//! - Key derivation defaults to HKDF; truncation is explicit legacy opt-in
//! - Bounded timeouts on every network wait

use crate::core::format::{BinaryTextEncoding, PayloadFormat};
use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::KeyDerivation;
use crate::protocol::session::{SessionTransport, TransportSession};
use crate::service::receiver::Receiver;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ExchangeConfig {
    /// Receiver-side configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Sender-side configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Cryptographic options shared by both sides
    #[serde(default)]
    pub security: SecurityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ExchangeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override with environment variables
        if let Ok(addr) = std::env::var("ECG_TRANSPORT_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("ECG_TRANSPORT_CLIENT_ADDRESS") {
            config.client.server_address = addr;
        }

        if let Ok(dir) = std::env::var("ECG_TRANSPORT_STAGING_DIR") {
            config.server.staging_dir = PathBuf::from(dir);
        }

        if let Ok(timeout) = std::env::var("ECG_TRANSPORT_RESPONSE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.response_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("ECG_TRANSPORT_CONNECTION_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.server.connection_timeout = Duration::from_millis(val);
                config.client.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(kind) = std::env::var("ECG_TRANSPORT_TRANSPORT") {
            match kind.to_lowercase().as_str() {
                "mllp" => config.client.transport = TransportKind::Mllp,
                "http" => config.client.transport = TransportKind::Http,
                other => {
                    return Err(ProtocolError::Config(format!(
                        "Unknown transport kind: '{other}'"
                    )))
                }
            }
        }

        // Add more environment variables as needed

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    /// Build a sender session from the client and security sections.
    pub fn build_session(&self) -> TransportSession {
        let transport = match self.client.transport {
            TransportKind::Mllp => SessionTransport::Mllp {
                addr: self.client.server_address.clone(),
            },
            TransportKind::Http => SessionTransport::Http {
                base_url: self.client.http_base_url.clone(),
            },
        };

        let mut session = TransportSession::new(transport)
            .with_timeouts(self.client.connect_timeout, self.client.response_timeout)
            .key_derivation(self.security.key_derivation)
            .binary_encoding(self.security.binary_encoding)
            .payload_format(self.client.payload_format);

        if let Some(dir) = &self.client.staging_dir {
            session = session.stage_to(dir.clone());
        }

        session
    }

    /// Build a receiver with a fresh ephemeral keypair from the server and
    /// security sections.
    pub fn build_receiver(&self) -> Receiver {
        Receiver::new(
            self.security.key_derivation,
            self.security.binary_encoding,
            &self.server.staging_dir,
        )
    }
}

/// Which transport carries the sealed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Framed line messages over TCP
    #[default]
    Mllp,
    /// JSON over HTTP
    Http,
}

/// Receiver-side configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Framed-transport listen address (e.g., "127.0.0.1:2575")
    pub address: String,

    /// HTTP receiver listen address (e.g., "127.0.0.1:8000")
    pub http_address: String,

    /// Directory where sealed blobs and decrypted records are staged
    pub staging_dir: PathBuf,

    /// Timeout for client connections
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:2575"),
            http_address: String::from("127.0.0.1:8000"),
            staging_dir: PathBuf::from("staging"),
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    /// Validate receiver configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:2575')",
                self.address
            ));
        }

        if self.http_address.is_empty() {
            errors.push("HTTP address cannot be empty".to_string());
        } else if self.http_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid HTTP address format: '{}' (expected format: '0.0.0.0:8000')",
                self.http_address
            ));
        }

        if self.staging_dir.as_os_str().is_empty() {
            errors.push("Staging directory cannot be empty".to_string());
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        } else if self.connection_timeout.as_secs() > 300 {
            errors.push("Connection timeout too long (maximum: 300s)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Sender-side configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target framed-transport address, `host:port`
    pub server_address: String,

    /// Target base URL for the HTTP transport
    pub http_base_url: String,

    /// Which transport carries the transfer
    pub transport: TransportKind,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Timeout for waiting for response messages
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,

    /// Serialization of the record plaintext
    pub payload_format: PayloadFormat,

    /// Optional directory for staging outbound sealed blobs
    pub staging_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: String::from("127.0.0.1:2575"),
            http_base_url: String::from("http://127.0.0.1:8000"),
            transport: TransportKind::Mllp,
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            response_timeout: timeout::DEFAULT_TIMEOUT,
            payload_format: PayloadFormat::Json,
            staging_dir: None,
        }
    }
}

impl ClientConfig {
    /// Validate sender configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server_address.is_empty() {
            errors.push("Client server address cannot be empty".to_string());
        } else if !self.server_address.contains(':') {
            errors.push(format!(
                "Invalid client server address: '{}' (expected format: 'example.com:2575')",
                self.server_address
            ));
        }

        if self.http_base_url.is_empty() {
            errors.push("HTTP base URL cannot be empty".to_string());
        } else if !self.http_base_url.starts_with("http://")
            && !self.http_base_url.starts_with("https://")
        {
            errors.push(format!(
                "Invalid HTTP base URL: '{}' (must start with http:// or https://)",
                self.http_base_url
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        if self.response_timeout.as_millis() < 100 {
            errors.push("Response timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Cryptographic options shared by sender and receiver
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SecurityConfig {
    /// How the AEAD key is derived from the KEM shared secret
    #[serde(default)]
    pub key_derivation: KeyDerivation,

    /// How binary values are encoded in text fields
    #[serde(default)]
    pub binary_encoding: BinaryTextEncoding,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("ecg-transport"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
