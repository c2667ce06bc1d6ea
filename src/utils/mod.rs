//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, staging, and timing.
//!
//! ## Components
//! - **Crypto**: Ascon-128 AEAD encryption with CSPRNG nonce generation
//! - **Logging**: Structured logging configuration
//! - **Staging**: Timestamped persistence of sealed blobs and decrypted records
//! - **Time**: Compact wall-clock timestamps for headers and filenames
//! - **Timeout**: Async timeout wrappers and default durations
//!
//! ## Security
//! - Cryptographically secure RNG for nonces (`rand_core::OsRng`)
//! - Memory zeroing for secret key material (zeroize crate)

pub mod crypto;
pub mod logging;
pub mod staging;
pub mod time;
pub mod timeout;

pub use crypto::Crypto;
