//! One-shot transport session driving a full sender-side exchange.
//!
//! A session walks `Idle -> AwaitingPublicKey -> PublicKeyReceived ->
//! SealingPayload -> AwaitingAck -> Acked`, or lands in `Failed` from any
//! state on timeout, transport, or decode errors. One handshake and one
//! transfer per instance; callers construct a new session per logical
//! transmission. The handshake strictly precedes the transfer, and the
//! receiver's reply acknowledges receipt, not successful decryption.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::format::{BinaryTextEncoding, PayloadFormat};
use crate::error::{ProtocolError, Result};
use crate::protocol::envelope::{self, JsonEnvelope, SecureEnvelope, TransferRecord};
use crate::protocol::handshake::{self, KeyDerivation};
use crate::transport::http::HttpClient;
use crate::transport::mllp::MllpClient;
use crate::utils::staging;
use crate::utils::timeout::DEFAULT_TIMEOUT;

/// Where a session's sealed envelope travels.
#[derive(Debug, Clone)]
pub enum SessionTransport {
    /// Framed line messages over TCP, `host:port`.
    Mllp { addr: String },
    /// JSON over HTTP against a base URL.
    Http { base_url: String },
}

/// Observable progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingPublicKey,
    PublicKeyReceived,
    SealingPayload,
    AwaitingAck,
    Acked,
    Failed,
}

/// What came back for a completed transfer.
#[derive(Debug, Clone)]
pub struct SessionReceipt {
    /// Record id the transfer was sent under.
    pub record_id: u64,
    /// Whether the peer's reply was an explicit accept. Any reply at all
    /// already counts as receipt.
    pub accepted: bool,
}

/// A single sender-side exchange: handshake, seal, transfer, ack.
pub struct TransportSession {
    transport: SessionTransport,
    derivation: KeyDerivation,
    encoding: BinaryTextEncoding,
    format: PayloadFormat,
    connect_timeout: Duration,
    response_timeout: Duration,
    staging_dir: Option<PathBuf>,
    state: SessionState,
}

impl TransportSession {
    /// A session with default timeouts, base64 encoding, HKDF derivation,
    /// and JSON payload format.
    pub fn new(transport: SessionTransport) -> Self {
        Self {
            transport,
            derivation: KeyDerivation::default(),
            encoding: BinaryTextEncoding::default(),
            format: PayloadFormat::default(),
            connect_timeout: DEFAULT_TIMEOUT,
            response_timeout: DEFAULT_TIMEOUT,
            staging_dir: None,
            state: SessionState::Idle,
        }
    }

    /// Set custom connect and response timeouts.
    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    pub fn key_derivation(mut self, derivation: KeyDerivation) -> Self {
        self.derivation = derivation;
        self
    }

    pub fn binary_encoding(mut self, encoding: BinaryTextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn payload_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Also stage the sealed blob locally before transmission, matching
    /// the receiver's staging layout.
    pub fn stage_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Current position in the session state machine.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the whole exchange for one record.
    ///
    /// # Errors
    /// Any handshake, seal, transport, or timeout error is terminal: the
    /// session transitions to `Failed` and a fresh session (with a fresh
    /// encapsulation) is required for another attempt. Reusing a finished
    /// session is itself an error.
    #[instrument(skip(self, plaintext, associated_data), fields(record_id = record.record_id))]
    pub async fn send_record(
        &mut self,
        record: &TransferRecord,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<SessionReceipt> {
        if self.state != SessionState::Idle {
            return Err(ProtocolError::Transport(format!(
                "session is one-shot, already in state {:?}",
                self.state
            )));
        }

        match self.transport.clone() {
            SessionTransport::Mllp { addr } => {
                self.run_mllp(&addr, record, plaintext, associated_data).await
            }
            SessionTransport::Http { base_url } => {
                self.run_http(&base_url, record, plaintext, associated_data)
                    .await
            }
        }
    }

    async fn run_mllp(
        &mut self,
        addr: &str,
        record: &TransferRecord,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<SessionReceipt> {
        self.state = SessionState::AwaitingPublicKey;
        let mut client =
            match MllpClient::connect(addr, self.connect_timeout, self.response_timeout).await {
                Ok(client) => client,
                Err(e) => return self.fail(e),
            };

        let public_key = match self.query_public_key(&mut client).await {
            Ok(key) => key,
            Err(e) => return self.fail(e),
        };
        self.state = SessionState::PublicKeyReceived;

        let envelope = match self.seal(&public_key, record, plaintext, associated_data) {
            Ok(envelope) => envelope,
            Err(e) => return self.fail(e),
        };

        let transfer =
            match envelope::to_transfer_message(&envelope, record, self.format, self.encoding) {
                Ok(message) => message,
                Err(e) => return self.fail(e),
            };

        self.state = SessionState::AwaitingAck;
        let reply = match client.exchange(&transfer).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(e),
        };

        self.state = SessionState::Acked;
        let accepted = reply.is_accepted();
        if !accepted {
            warn!(record_id = record.record_id, "Transfer acknowledged with an error code");
        }
        info!(record_id = record.record_id, accepted, "Transfer acknowledged");

        Ok(SessionReceipt {
            record_id: record.record_id,
            accepted,
        })
    }

    async fn run_http(
        &mut self,
        base_url: &str,
        record: &TransferRecord,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<SessionReceipt> {
        self.state = SessionState::AwaitingPublicKey;
        let client = match HttpClient::new(base_url, self.response_timeout) {
            Ok(client) => client,
            Err(e) => return self.fail(e),
        };

        let public_key = match client.fetch_public_key().await {
            Ok(key) => key,
            Err(e) => return self.fail(e),
        };
        self.state = SessionState::PublicKeyReceived;

        let envelope = match self.seal(&public_key, record, plaintext, associated_data) {
            Ok(envelope) => envelope,
            Err(e) => return self.fail(e),
        };

        let body = JsonEnvelope::from_envelope(&envelope, record.record_id, self.encoding);
        self.state = SessionState::AwaitingAck;
        match client.post_envelope(&body).await {
            Ok(ack_body) => {
                self.state = SessionState::Acked;
                debug!(record_id = record.record_id, body = %ack_body, "Transfer acknowledged");
                Ok(SessionReceipt {
                    record_id: record.record_id,
                    accepted: true,
                })
            }
            Err(e) => self.fail(e),
        }
    }

    async fn query_public_key(&self, client: &mut MllpClient) -> Result<Vec<u8>> {
        let query = handshake::build_public_key_query()?;
        let response = client.exchange(&query).await?;
        handshake::extract_public_key(&response, self.encoding)
    }

    fn seal(
        &mut self,
        public_key: &[u8],
        record: &TransferRecord,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<SecureEnvelope> {
        self.state = SessionState::SealingPayload;
        let sealed = envelope::seal(public_key, plaintext, associated_data, self.derivation)?;

        if let Some(dir) = &self.staging_dir {
            let path = staging::stage_ciphertext(dir, record.record_id, sealed.ciphertext())?;
            debug!(path = %path.display(), "Staged outbound sealed blob");
        }

        Ok(sealed)
    }

    fn fail<T>(&mut self, error: ProtocolError) -> Result<T> {
        warn!(error = %error, "Session failed");
        self.state = SessionState::Failed;
        Err(error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sessions_start_idle() {
        let session = TransportSession::new(SessionTransport::Mllp {
            addr: "127.0.0.1:2575".into(),
        });
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn connect_failure_is_terminal() {
        // Reserved port on localhost with nothing listening.
        let mut session = TransportSession::new(SessionTransport::Mllp {
            addr: "127.0.0.1:1".into(),
        })
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(500));

        let record = TransferRecord::new(1);
        let result = session.send_record(&record, b"payload", b"").await;
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Failed);

        // One-shot: the failed session refuses reuse.
        assert!(matches!(
            session.send_record(&record, b"payload", b"").await,
            Err(ProtocolError::Transport(_))
        ));
    }
}
