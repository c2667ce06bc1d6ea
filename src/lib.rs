//! # ECG Transport
//!
//! Post-quantum secured transport for ECG observation records.
//!
//! A sender fetches the receiver's Kyber512 public key, encapsulates a
//! fresh shared secret, derives an Ascon-128 key from it, seals the record
//! with a random nonce, and ships the envelope either as an HL7 v2 line
//! message over MLLP-framed TCP or as JSON over HTTP. The receiver
//! acknowledges receipt, stages the sealed blob, and opens it best-effort.
//!
//! ## Modules
//! - [`core`]: framing, line messages, chunking, payload formats
//! - [`protocol`]: KEM handshake, envelope sealing, the one-shot session
//! - [`transport`]: MLLP client/server and the HTTP variant
//! - [`service`]: receiver-side dispatch and staging
//! - [`config`]: TOML/env configuration
//! - [`utils`]: AEAD primitives, logging, staging, timestamps, timeouts
//!
//! ## Quick start
//! ```no_run
//! use ecg_transport::protocol::envelope::TransferRecord;
//! use ecg_transport::protocol::session::{SessionTransport, TransportSession};
//!
//! # async fn run() -> ecg_transport::error::Result<()> {
//! let mut session = TransportSession::new(SessionTransport::Mllp {
//!     addr: "127.0.0.1:2575".into(),
//! });
//! let record = TransferRecord::new(42);
//! let receipt = session.send_record(&record, b"{\"samples\":[]}", b"").await?;
//! assert!(receipt.accepted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security
//! - Kyber512 KEM with a fresh encapsulation per session
//! - Ascon-128 AEAD, 16-byte key and nonce, random nonce per seal
//! - Secret keys zeroized on drop; shared secrets never leave the
//!   handshake module

#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::ExchangeConfig;
pub use error::{ProtocolError, Result};
pub use protocol::envelope::{SecureEnvelope, TransferRecord};
pub use protocol::session::{SessionReceipt, SessionState, SessionTransport, TransportSession};
pub use service::receiver::Receiver;
