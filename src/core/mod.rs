//! # Core Wire Components
//!
//! Stream framing, line-message encoding, ciphertext chunking, and the
//! payload/text format tags.
//!
//! This module provides the foundation for the exchange: how bytes are
//! framed on a stream, how structured line messages are built and decoded,
//! and how oversized ciphertexts are split across observation segments.
//!
//! ## Components
//! - **Framing**: MLLP block markers and the tokio codec over byte streams
//! - **Message**: Line-message construction and tolerant decoding
//! - **Chunk**: Fixed-size ciphertext chunking with fail-closed reassembly
//! - **Format**: Payload serialization tags and binary-in-text encodings
//!
//! ## Security
//! - Reassembly rejects any gap in the chunk sequence
//! - Decoding never panics on malformed input; errors are typed

pub mod chunk;
pub mod format;
pub mod framing;
pub mod message;
