//! Server-side message dispatch.
//!
//! The receiver owns the process-lifetime KEM keypair and answers the two
//! inbound message kinds: public-key queries get the encoded key back, and
//! observation transfers are acknowledged on parse, staged, and opened
//! best-effort. A failed decrypt is logged, never signalled to the sender;
//! the ack only ever means "received and parseable".

use std::path::{Path, PathBuf};

use tracing::{debug, error, instrument, warn};

use crate::core::format::{BinaryTextEncoding, PayloadFormat};
use crate::core::message::{
    AckCode, AckSegment, DecodedMessage, HeaderSegment, LineMessage, MessageKind, Segment,
};
use crate::error::{ProtocolError, Result};
use crate::protocol::envelope::{self, JsonEnvelope, SecureEnvelope};
use crate::protocol::handshake::{self, KeyDerivation, ServerKeyPair};
use crate::utils::staging;
use crate::utils::time::current_timestamp_millis;

/// Long-lived receiver state shared across connections.
///
/// The keypair is read-only after construction, so the whole receiver is
/// shared behind an `Arc` without locking.
pub struct Receiver {
    keypair: ServerKeyPair,
    derivation: KeyDerivation,
    encoding: BinaryTextEncoding,
    staging_dir: PathBuf,
}

impl Receiver {
    /// Build a receiver around a fresh ephemeral keypair.
    pub fn new(
        derivation: KeyDerivation,
        encoding: BinaryTextEncoding,
        staging_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            keypair: ServerKeyPair::generate(),
            derivation,
            encoding,
            staging_dir: staging_dir.as_ref().to_path_buf(),
        }
    }

    /// Raw public key bytes served to senders.
    pub fn public_key(&self) -> &[u8] {
        self.keypair.public_key()
    }

    /// Dispatch one deframed inbound message and build the reply, if any.
    ///
    /// Frames that are not UTF-8 or not decodable line messages produce no
    /// reply; there is no control id to acknowledge against.
    #[instrument(skip(self, frame))]
    pub fn handle_frame(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let text = match std::str::from_utf8(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Discarding non-UTF-8 frame");
                return None;
            }
        };

        let message = match DecodedMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Discarding undecodable frame");
                return None;
            }
        };

        match message.message_kind() {
            Some(MessageKind::Query) => self.answer_query(&message),
            Some(MessageKind::ObservationResult) => self.answer_transfer(&message),
            other => {
                debug!(kind = ?other, "Ignoring message kind");
                None
            }
        }
    }

    fn answer_query(&self, message: &DecodedMessage) -> Option<Vec<u8>> {
        let control_id = message.control_id().unwrap_or_default();
        debug!(control_id = %control_id, "Answering public-key query");

        match handshake::build_public_key_response(self.public_key(), control_id, self.encoding) {
            Ok(response) => Some(response.encode().into_bytes()),
            Err(e) => {
                error!(error = %e, "Failed to build public-key response");
                None
            }
        }
    }

    fn answer_transfer(&self, message: &DecodedMessage) -> Option<Vec<u8>> {
        let control_id = message.control_id().unwrap_or_default().to_string();

        let (code, envelope) =
            match envelope::from_transfer_message(message, self.encoding) {
                Ok(envelope) => (AckCode::Accept, Some(envelope)),
                Err(e) => {
                    warn!(control_id = %control_id, error = %e, "Rejecting malformed transfer");
                    (AckCode::Error, None)
                }
            };

        if let Some(envelope) = envelope {
            let record_id = envelope::record_id(message).unwrap_or_default();
            let format = envelope::payload_format(message);
            if let Err(e) = self.accept_envelope(&envelope, record_id, format) {
                error!(record_id, error = %e, "Failed to stage inbound transfer");
            }
        }

        match build_ack(code, &control_id) {
            Ok(ack) => Some(ack.encode().into_bytes()),
            Err(e) => {
                error!(error = %e, "Failed to build acknowledgement");
                None
            }
        }
    }

    /// Handle a `POST /secure-ecg` JSON body.
    ///
    /// Parses the envelope, stages and best-effort opens it, and returns
    /// the record id for the acknowledgement body. HTTP payloads carry no
    /// format field; records are staged as JSON.
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedMessage` for unparsable JSON and
    /// `ProtocolError::Encoding` for undecodable fields.
    pub fn handle_json_body(&self, body: &str) -> Result<u64> {
        let parsed: JsonEnvelope = serde_json::from_str(body)
            .map_err(|e| ProtocolError::MalformedMessage(format!("invalid JSON body: {e}")))?;
        let (envelope, record_id) = parsed.into_envelope(self.encoding)?;
        self.accept_envelope(&envelope, record_id, PayloadFormat::Json)?;
        Ok(record_id)
    }

    /// Stage an inbound envelope and attempt to open it.
    ///
    /// The sealed blob is always persisted. Opening is best-effort: on
    /// success the plaintext record is staged next to it, on authentication
    /// failure only a log line is produced.
    ///
    /// # Errors
    /// Returns staging I/O errors; decrypt failure is not an error here.
    pub fn accept_envelope(
        &self,
        envelope: &SecureEnvelope,
        record_id: u64,
        format: PayloadFormat,
    ) -> Result<()> {
        let blob_path =
            staging::stage_ciphertext(&self.staging_dir, record_id, envelope.ciphertext())?;
        debug!(record_id, path = %blob_path.display(), "Staged sealed blob");

        match envelope::open(&self.keypair, envelope, self.derivation) {
            Ok(plaintext) => {
                let record_path =
                    staging::stage_record(&self.staging_dir, record_id, format, &plaintext)?;
                debug!(record_id, path = %record_path.display(), "Staged decrypted record");
            }
            Err(e) => {
                warn!(record_id, error = %e, "Inbound payload failed to open");
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}

/// Build an `ACK^R01` acknowledging the given inbound control id.
///
/// # Errors
/// Returns timestamp errors if system time is invalid.
pub fn build_ack(code: AckCode, acked_control_id: &str) -> Result<LineMessage> {
    let control_id = current_timestamp_millis()?.to_string();
    let header = HeaderSegment::new(MessageKind::Acknowledgement, control_id)?;
    Ok(LineMessage::new(header).with(Segment::Ack(AckSegment::new(code, acked_control_id))))
}
