//! # Protocol Layer
//!
//! Key establishment, envelope sealing, and the sender-side session.
//!
//! ## Components
//! - **Handshake**: Kyber512 public-key query/response and key derivation
//! - **Envelope**: seal/open around Ascon-128 plus wire packaging
//! - **Session**: the one-shot state machine driving a full exchange
//!
//! ## Security
//! - A fresh KEM encapsulation per session; no key reuse across transfers
//! - Shared secrets are derived into cipher keys and never exposed raw

pub mod envelope;
pub mod handshake;
pub mod session;
