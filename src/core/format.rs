//! # Payload and text-encoding formats
//!
//! Tags describing how a record plaintext is serialized and how binary
//! values ride inside text fields. Base64 is the canonical binary-in-text
//! encoding; hex survives only as a legacy compatibility mode for peers
//! deployed before the consolidation.

use crate::error::{ProtocolError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Serialization of the record plaintext, advertised in transfer messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadFormat {
    /// Row-oriented JSON records (default)
    #[default]
    Json,
    /// XML document with one element per sample row
    Xml,
}

impl PayloadFormat {
    /// Wire tag carried in the format observation field
    pub fn tag(self) -> &'static str {
        match self {
            PayloadFormat::Json => "JSON",
            PayloadFormat::Xml => "XML",
        }
    }

    /// Parse a wire tag; unknown tags are rejected
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "JSON" => Some(PayloadFormat::Json),
            "XML" => Some(PayloadFormat::Xml),
            _ => None,
        }
    }

    /// File extension for staged decrypted records
    pub fn extension(self) -> &'static str {
        match self {
            PayloadFormat::Json => "json",
            PayloadFormat::Xml => "xml",
        }
    }
}

/// How binary values are encoded when carried in text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryTextEncoding {
    /// Canonical encoding for all binary-in-text fields
    #[default]
    Base64,
    /// Legacy compatibility with hex-emitting peers
    Hex,
}

impl BinaryTextEncoding {
    /// Encode bytes to text in this encoding
    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            BinaryTextEncoding::Base64 => BASE64.encode(bytes),
            BinaryTextEncoding::Hex => hex::encode(bytes),
        }
    }

    /// Decode text in this encoding
    pub fn decode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            BinaryTextEncoding::Base64 => BASE64
                .decode(text)
                .map_err(|e| ProtocolError::Encoding(format!("invalid base64: {e}"))),
            BinaryTextEncoding::Hex => hex::decode(text)
                .map_err(|e| ProtocolError::Encoding(format!("invalid hex: {e}"))),
        }
    }

}
