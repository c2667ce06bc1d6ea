//! Public-key handshake built on the Kyber KEM (level 1).
//!
//! The exchange is one-sided: the receiver owns a long-lived Kyber keypair,
//! the sender fetches the public key (line-message query or HTTP GET),
//! encapsulates against it, and both sides derive the same 16-byte AEAD key
//! from the shared secret. There is no multi-round negotiation and no
//! session resumption; every transfer starts from a fresh encapsulation.
//!
//! The shared secret never leaves this module: callers only ever see the
//! derived symmetric key.

use crate::core::format::BinaryTextEncoding;
use crate::core::message::{
    tags, DecodedMessage, HeaderSegment, LineMessage, MessageKind, ObservationSegment,
    QuerySegment, Segment,
};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::KEY_LEN;
use crate::utils::time::current_timestamp_millis;
use hkdf::Hkdf;
use pqcrypto_kyber::kyber512;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

#[allow(unused_imports)]
use tracing::{debug, instrument, warn};

/// Kyber level-1 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 800;

/// Kyber level-1 encapsulation ciphertext length in bytes.
pub const KEM_CIPHERTEXT_LEN: usize = 768;

/// Raw KEM shared secret length in bytes.
pub const SHARED_SECRET_LEN: usize = 32;

/// Domain-separation label for the HKDF expansion.
const KEY_DERIVATION_INFO: &[u8] = b"ascon-key-derivation";

/// How the 16-byte AEAD key is derived from the 32-byte KEM shared secret.
///
/// `HkdfSha256` is the default. `LegacyTruncate` takes the first 16 bytes
/// of the shared secret unchanged and exists only for peers deployed before
/// the derivation step was introduced; it must be selected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyDerivation {
    #[default]
    HkdfSha256,
    LegacyTruncate,
}

impl KeyDerivation {
    /// Derive the AEAD key from a raw shared secret.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidKey` if the shared secret does not
    /// have the expected KEM output length.
    pub fn derive(self, shared_secret: &[u8]) -> Result<[u8; KEY_LEN]> {
        if shared_secret.len() != SHARED_SECRET_LEN {
            return Err(ProtocolError::InvalidKey(format!(
                "shared secret must be {SHARED_SECRET_LEN} bytes, got {}",
                shared_secret.len()
            )));
        }

        let mut key = [0u8; KEY_LEN];
        match self {
            KeyDerivation::HkdfSha256 => {
                let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
                hkdf.expand(KEY_DERIVATION_INFO, &mut key)
                    .map_err(|_| ProtocolError::InvalidKey("HKDF expansion failed".into()))?;
            }
            KeyDerivation::LegacyTruncate => {
                key.copy_from_slice(&shared_secret[..KEY_LEN]);
            }
        }
        Ok(key)
    }
}

/// The receiver's long-lived KEM keypair.
///
/// The secret key bytes are zeroized when the pair is dropped.
pub struct ServerKeyPair {
    public: Vec<u8>,
    secret: Zeroizing<Vec<u8>>,
}

impl ServerKeyPair {
    /// Generate a fresh keypair from the OS entropy source.
    #[instrument]
    pub fn generate() -> Self {
        let (public, secret) = kyber512::keypair();
        debug!("Generated receiver KEM keypair");
        Self {
            public: public.as_bytes().to_vec(),
            secret: Zeroizing::new(secret.as_bytes().to_vec()),
        }
    }

    /// Raw public key bytes, as served to senders.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Recover the AEAD key from an encapsulation ciphertext.
    ///
    /// Kyber rejects tampering implicitly: a corrupted ciphertext still
    /// decapsulates, but to a different secret, and the AEAD layer then
    /// refuses the payload.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidKey` if the ciphertext has the wrong
    /// length or the stored secret key fails to parse.
    #[instrument(skip(self, kem_ciphertext))]
    pub fn decapsulate(
        &self,
        kem_ciphertext: &[u8],
        derivation: KeyDerivation,
    ) -> Result<[u8; KEY_LEN]> {
        if kem_ciphertext.len() != KEM_CIPHERTEXT_LEN {
            return Err(ProtocolError::InvalidKey(format!(
                "KEM ciphertext must be {KEM_CIPHERTEXT_LEN} bytes, got {}",
                kem_ciphertext.len()
            )));
        }

        let secret = kyber512::SecretKey::from_bytes(&self.secret)
            .map_err(|e| ProtocolError::InvalidKey(format!("stored secret key: {e}")))?;
        let ciphertext = kyber512::Ciphertext::from_bytes(kem_ciphertext)
            .map_err(|e| ProtocolError::InvalidKey(format!("KEM ciphertext: {e}")))?;

        let shared = kyber512::decapsulate(&ciphertext, &secret);
        derivation.derive(shared.as_bytes())
    }
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("public_len", &self.public.len())
            .finish_non_exhaustive()
    }
}

/// Encapsulate against a peer's public key and derive the AEAD key.
///
/// Every call produces a fresh encapsulation; nothing is cached.
///
/// # Returns
/// The KEM ciphertext to send alongside the payload, and the derived key.
///
/// # Errors
/// Returns `ProtocolError::InvalidKey` if the public key has the wrong
/// length or fails to parse.
#[instrument(skip(public_key))]
pub fn encapsulate(public_key: &[u8], derivation: KeyDerivation) -> Result<(Vec<u8>, [u8; KEY_LEN])> {
    if public_key.len() != PUBLIC_KEY_LEN {
        return Err(ProtocolError::InvalidKey(format!(
            "{}: expected {PUBLIC_KEY_LEN} bytes, got {}",
            constants::ERR_PUBLIC_KEY_LENGTH,
            public_key.len()
        )));
    }

    let public = kyber512::PublicKey::from_bytes(public_key)
        .map_err(|e| ProtocolError::InvalidKey(format!("public key: {e}")))?;
    let (shared, ciphertext) = kyber512::encapsulate(&public);
    let key = derivation.derive(shared.as_bytes())?;

    debug!("Encapsulated fresh transfer key");
    Ok((ciphertext.as_bytes().to_vec(), key))
}

/// Fresh message control id from the wall clock.
fn next_control_id() -> Result<String> {
    current_timestamp_millis().map(|millis| millis.to_string())
}

/// Build the public-key query message (`QBP^Q11`).
///
/// # Errors
/// Returns timestamp errors if system time is invalid.
pub fn build_public_key_query() -> Result<LineMessage> {
    let header = HeaderSegment::new(MessageKind::Query, &next_control_id()?)?;
    let query = QuerySegment::new(tags::PUBLIC_KEY)
        .parameter("QUERY")
        .parameter("REQUEST");
    Ok(LineMessage::new(header).with(Segment::Query(query)))
}

/// Build the public-key response (`RSP^K11`) carrying the encoded key.
///
/// The response acknowledges the query's control id and echoes the query
/// definition so the sender can correlate it.
///
/// # Errors
/// Returns timestamp errors if system time is invalid.
pub fn build_public_key_response(
    public_key: &[u8],
    query_control_id: &str,
    encoding: BinaryTextEncoding,
) -> Result<LineMessage> {
    use crate::core::message::{AckCode, AckSegment};

    let header = HeaderSegment::new(MessageKind::QueryResponse, &next_control_id()?)?;
    let identifier = format!("{}^Kyber Public Key", tags::PUBLIC_KEY);
    Ok(LineMessage::new(header)
        .with(Segment::Ack(AckSegment::new(AckCode::Accept, query_control_id)))
        .with(Segment::Query(
            QuerySegment::new(tags::PUBLIC_KEY)
                .parameter("QUERY")
                .parameter("REQUEST"),
        ))
        .with(Segment::Observation(ObservationSegment::text(
            1,
            identifier,
            &encoding.encode(public_key),
        ))))
}

/// Extract and decode the public key from a decoded response message.
///
/// The lookup matches any observation whose identifier starts with the
/// public-key tag, so component suffixes and segment order do not matter.
///
/// # Errors
/// Returns `ProtocolError::Handshake` when the observation is missing, the
/// text does not decode, or the decoded key has the wrong length.
pub fn extract_public_key(
    message: &DecodedMessage,
    encoding: BinaryTextEncoding,
) -> Result<Vec<u8>> {
    let encoded = message
        .observation_value(tags::PUBLIC_KEY)
        .map_err(|_| ProtocolError::Handshake(constants::ERR_PUBLIC_KEY_MISSING.into()))?;

    let key = encoding
        .decode(encoded)
        .map_err(|_| ProtocolError::Handshake(constants::ERR_PUBLIC_KEY_ENCODING.into()))?;

    if key.len() != PUBLIC_KEY_LEN {
        return Err(ProtocolError::Handshake(format!(
            "{}: expected {PUBLIC_KEY_LEN} bytes, got {}",
            constants::ERR_PUBLIC_KEY_LENGTH,
            key.len()
        )));
    }

    Ok(key)
}
