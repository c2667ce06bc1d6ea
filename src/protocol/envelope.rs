//! Sealed payload envelopes and their wire packaging.
//!
//! A `SecureEnvelope` is the bundle produced by one `seal` call: fresh KEM
//! encapsulation, derived 16-byte key, fresh random nonce, Ascon-128
//! ciphertext with its trailing tag, and the (optional) associated data.
//! Envelopes are immutable after construction and are packaged two ways:
//! as an `ORU^R01` line message for the MLLP transport, or as a JSON body
//! for the HTTP transport.
//!
//! Opening is the exact inverse and fails closed: a bad tag, wrong key, or
//! altered nonce surfaces as `Authentication` with no partial plaintext.

use crate::core::chunk;
use crate::core::format::{BinaryTextEncoding, PayloadFormat};
use crate::core::message::{
    tags, DecodedMessage, HeaderSegment, LineMessage, MessageKind, ObservationSegment,
    OrderSegment, PatientSegment, Segment,
};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::{self, KeyDerivation, ServerKeyPair};
use crate::utils::crypto::{Crypto, NONCE_LEN};
use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use tracing::{debug, instrument};

/// One sealed transfer: nonce, KEM ciphertext, AEAD ciphertext, and the
/// associated data the tag binds. Immutable once constructed.
pub struct SecureEnvelope {
    nonce: [u8; NONCE_LEN],
    encapsulated_key: Vec<u8>,
    ciphertext: Vec<u8>,
    associated_data: Vec<u8>,
}

impl SecureEnvelope {
    /// AEAD nonce for this transfer.
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// KEM encapsulation ciphertext, transmitted in the clear.
    pub fn encapsulated_key(&self) -> &[u8] {
        &self.encapsulated_key
    }

    /// AEAD ciphertext, tag included.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Associated data bound by the AEAD tag. Empty by default; never on
    /// the wire, so both peers must agree on it out of band.
    pub fn associated_data(&self) -> &[u8] {
        &self.associated_data
    }
}

impl std::fmt::Debug for SecureEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureEnvelope")
            .field("encapsulated_key_len", &self.encapsulated_key.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Seal a plaintext for the holder of `public_key`.
///
/// Performs a fresh encapsulation and draws a fresh random nonce on every
/// call; nothing is cached between transfers.
///
/// # Errors
/// Returns `ProtocolError::InvalidKey` for a malformed public key and
/// `ProtocolError::Custom` if the AEAD refuses the input.
#[instrument(skip_all)]
pub fn seal(
    public_key: &[u8],
    plaintext: &[u8],
    associated_data: &[u8],
    derivation: KeyDerivation,
) -> Result<SecureEnvelope> {
    seal_with_nonce(
        public_key,
        plaintext,
        associated_data,
        Crypto::generate_nonce(),
        derivation,
    )
}

/// Seal with a caller-supplied nonce.
///
/// Exists for deterministic tests; production paths go through [`seal`],
/// which draws the nonce from the OS CSPRNG. Reusing a nonce under one key
/// voids the AEAD's guarantees.
pub fn seal_with_nonce(
    public_key: &[u8],
    plaintext: &[u8],
    associated_data: &[u8],
    nonce: [u8; NONCE_LEN],
    derivation: KeyDerivation,
) -> Result<SecureEnvelope> {
    let (encapsulated_key, key) = handshake::encapsulate(public_key, derivation)?;
    let ciphertext = Crypto::new(&key).encrypt(plaintext, &nonce, associated_data)?;

    debug!(
        ciphertext_len = ciphertext.len(),
        "Sealed payload envelope"
    );

    Ok(SecureEnvelope {
        nonce,
        encapsulated_key,
        ciphertext,
        associated_data: associated_data.to_vec(),
    })
}

/// Open a sealed envelope with the receiver's keypair.
///
/// # Errors
/// Returns `ProtocolError::Authentication` when the tag does not verify
/// (tampered ciphertext, wrong key, or wrong nonce); no partial plaintext
/// is ever returned.
#[instrument(skip_all)]
pub fn open(
    keypair: &ServerKeyPair,
    envelope: &SecureEnvelope,
    derivation: KeyDerivation,
) -> Result<Vec<u8>> {
    let key = keypair.decapsulate(&envelope.encapsulated_key, derivation)?;
    Crypto::new(&key).decrypt(
        &envelope.ciphertext,
        &envelope.nonce,
        &envelope.associated_data,
    )
}

/// Clinical skeleton carried ahead of the crypto fields in a transfer.
///
/// The receiver ignores these for decryption; they exist so the message
/// reads as a complete observation result to intermediaries.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub record_id: u64,
    pub patient_id: String,
    pub patient_name: String,
    pub report: String,
}

impl TransferRecord {
    /// A record with placeholder demographics, identified only by id.
    pub fn new(record_id: u64) -> Self {
        Self {
            record_id,
            patient_id: format!("ECG{record_id}"),
            patient_name: "UNKNOWN^UNKNOWN".into(),
            report: "Encrypted ECG record".into(),
        }
    }

    pub fn patient(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.patient_id = id.into();
        self.patient_name = name.into();
        self
    }

    pub fn report(mut self, report: impl Into<String>) -> Self {
        self.report = report.into();
        self
    }
}

/// Package an envelope as an `ORU^R01` transfer message.
///
/// The record id doubles as the message control id so the returned ack can
/// be correlated. `encoding` covers the nonce and KEM ciphertext fields;
/// the payload ciphertext itself is always base64 text (the chunk layer
/// reassembles by concatenate-then-base64-decode).
///
/// # Errors
/// Returns timestamp errors if system time is invalid.
pub fn to_transfer_message(
    envelope: &SecureEnvelope,
    record: &TransferRecord,
    format: PayloadFormat,
    encoding: BinaryTextEncoding,
) -> Result<LineMessage> {
    let header = HeaderSegment::new(MessageKind::ObservationResult, record.record_id.to_string())?;
    let order = OrderSegment::new(1, format!("ECG{}", record.record_id))?;

    let mut message = LineMessage::new(header)
        .with(Segment::Patient(PatientSegment::new(
            &record.patient_id,
            &record.patient_name,
        )))
        .with(Segment::Order(order));

    let fields = [
        (format!("{}^Report", tags::REPORT), record.report.clone()),
        (
            format!("{}^Payload Format", tags::FORMAT),
            format.tag().to_string(),
        ),
        (
            format!("{}^Record Id", tags::RECORD_ID),
            record.record_id.to_string(),
        ),
        (
            format!("{}^AEAD Nonce", tags::NONCE),
            encoding.encode(&envelope.nonce),
        ),
        (
            format!("{}^Encapsulated Key", tags::KEM_CIPHERTEXT),
            encoding.encode(&envelope.encapsulated_key),
        ),
    ];

    let mut set_id = 1u32;
    for (identifier, value) in fields {
        message.push(Segment::Observation(ObservationSegment::text(
            set_id, identifier, value,
        )));
        set_id += 1;
    }

    let ciphertext_text = BinaryTextEncoding::Base64.encode(&envelope.ciphertext);
    if chunk::needs_chunking(ciphertext_text.len()) {
        for segment in chunk::chunk_segments(&ciphertext_text, set_id) {
            message.push(Segment::Observation(segment));
        }
    } else {
        message.push(Segment::Observation(ObservationSegment::text(
            set_id,
            format!("{}^Sealed Record", tags::CIPHERTEXT),
            ciphertext_text,
        )));
    }

    Ok(message)
}

/// Rebuild an envelope from a decoded `ORU^R01` message.
///
/// The ciphertext comes from the chunk sequence when present, otherwise
/// from the single ciphertext field. Associated data is not carried on the
/// wire and is empty here.
///
/// # Errors
/// Missing crypto fields surface as `FieldNotFound`, undecodable values as
/// `Encoding`, and an absent ciphertext (neither form) as
/// `ChunkReassembly`.
pub fn from_transfer_message(
    message: &DecodedMessage,
    encoding: BinaryTextEncoding,
) -> Result<SecureEnvelope> {
    let nonce_bytes = encoding.decode(message.observation_value(tags::NONCE)?)?;
    let nonce: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| ProtocolError::Encoding(constants::ERR_NONCE_LENGTH.into()))?;

    let encapsulated_key = encoding.decode(message.observation_value(tags::KEM_CIPHERTEXT)?)?;

    let ciphertext = match chunk::reassemble(message.observations())? {
        Some(bytes) => bytes,
        None => {
            let text = message.observation_value(tags::CIPHERTEXT).map_err(|_| {
                ProtocolError::ChunkReassembly(constants::ERR_NO_CIPHERTEXT.into())
            })?;
            BinaryTextEncoding::Base64.decode(text)?
        }
    };

    Ok(SecureEnvelope {
        nonce,
        encapsulated_key,
        ciphertext,
        associated_data: Vec::new(),
    })
}

/// Record id advertised in a transfer message, if present and numeric.
pub fn record_id(message: &DecodedMessage) -> Option<u64> {
    message
        .observation_value(tags::RECORD_ID)
        .ok()
        .and_then(|value| value.parse().ok())
}

/// Advertised plaintext serialization; defaults to JSON when the field is
/// absent or unknown.
pub fn payload_format(message: &DecodedMessage) -> PayloadFormat {
    message
        .observation_value(tags::FORMAT)
        .ok()
        .and_then(PayloadFormat::from_tag)
        .unwrap_or_default()
}

/// HTTP body shape for `POST /secure-ecg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonEnvelope {
    pub nonce: String,
    pub ciphertext: String,
    pub kyber_ciphertext: String,
    pub id: u64,
}

impl JsonEnvelope {
    /// Encode an envelope for the HTTP transport.
    pub fn from_envelope(envelope: &SecureEnvelope, id: u64, encoding: BinaryTextEncoding) -> Self {
        Self {
            nonce: encoding.encode(&envelope.nonce),
            ciphertext: encoding.encode(&envelope.ciphertext),
            kyber_ciphertext: encoding.encode(&envelope.encapsulated_key),
            id,
        }
    }

    /// Decode the body back into an envelope and its record id.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encoding` for undecodable fields or a
    /// wrong-length nonce.
    pub fn into_envelope(&self, encoding: BinaryTextEncoding) -> Result<(SecureEnvelope, u64)> {
        let nonce: [u8; NONCE_LEN] = encoding
            .decode(&self.nonce)?
            .try_into()
            .map_err(|_| ProtocolError::Encoding(constants::ERR_NONCE_LENGTH.into()))?;

        Ok((
            SecureEnvelope {
                nonce,
                encapsulated_key: encoding.decode(&self.kyber_ciphertext)?,
                ciphertext: encoding.decode(&self.ciphertext)?,
                associated_data: Vec::new(),
            },
            self.id,
        ))
    }
}
