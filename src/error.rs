//! # Error Types
//!
//! Comprehensive error handling for the secure ECG transport core.
//!
//! This module defines all error variants that can occur during an exchange,
//! from low-level I/O errors to protocol violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Network and file system failures
//! - **Handshake Errors**: Public-key retrieval failures (timeout, malformed response, missing field)
//! - **Cryptographic Errors**: Invalid KEM keys, AEAD authentication failures
//! - **Message Errors**: Malformed line messages, missing observation fields, chunk gaps
//! - **Transport Errors**: Connection loss, HTTP failures, bounded waits exceeded
//!
//! All errors are terminal to the current session: nothing is retried
//! internally, and the caller restarts a whole exchange (fresh handshake,
//! fresh encapsulation) if it wants another attempt.
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use ecg_transport::error::{ProtocolError, Result};
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|e| ProtocolError::Config(format!("invalid port '{raw}': {e}")))
//! }
//!
//! assert!(parse_port("2575").is_ok());
//! assert!(parse_port("no").is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Handshake errors
    pub const ERR_EMPTY_RESPONSE: &str = "Empty handshake response";
    pub const ERR_PUBLIC_KEY_MISSING: &str = "No public-key observation in response";
    pub const ERR_PUBLIC_KEY_ENCODING: &str = "Public key is not valid base64";
    pub const ERR_PUBLIC_KEY_LENGTH: &str = "Public key has the wrong length";

    /// Message errors
    pub const ERR_MISSING_HEADER: &str = "Message does not start with a header segment";
    pub const ERR_FIELD_NOT_FOUND: &str = "Observation field not found";
    pub const ERR_EMPTY_MESSAGE: &str = "Message contains no segments";

    /// Chunk reassembly errors
    pub const ERR_CHUNK_GAP: &str = "Missing chunk in sequence";
    pub const ERR_CHUNK_INDEX: &str = "Chunk sequence index is not a positive integer";
    pub const ERR_NO_CIPHERTEXT: &str = "Message carries neither a ciphertext field nor chunks";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_CONNECTION_TIMEOUT: &str = "Connection timed out (no activity)";
    pub const ERR_TIMEOUT: &str = "Operation timed out";

    /// Cryptographic errors
    pub const ERR_AUTHENTICATION_FAILED: &str = "Payload authentication failed";
    pub const ERR_ENCRYPTION_FAILED: &str = "Encryption failed";
    pub const ERR_NONCE_LENGTH: &str = "Nonce has the wrong length";
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
}

/// ProtocolError is the primary error type for all exchange operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Payload authentication failed")]
    Authentication,

    #[error("Chunk reassembly failed: {0}")]
    ChunkReassembly(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
