//! HTTP variant of the exchange.
//!
//! The client fetches the raw public key from `GET /kyber-public-key` and
//! posts sealed envelopes as JSON to `POST /secure-ecg`. The embedded
//! receiver serves both endpoints from the same ephemeral keypair the
//! framed transport uses, on a plain blocking HTTP server running in its
//! own thread.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tiny_http::{Header, Method, Response, Server};
use tracing::{debug, info, instrument, warn};

use crate::error::{ProtocolError, Result};
use crate::protocol::envelope::JsonEnvelope;
use crate::service::receiver::Receiver;

/// Path serving the raw public-key bytes.
pub const PUBLIC_KEY_PATH: &str = "/kyber-public-key";

/// Path accepting sealed envelope bodies.
pub const TRANSFER_PATH: &str = "/secure-ecg";

/// Async HTTP client for the exchange endpoints.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Build a client with one timeout covering connect and response.
    ///
    /// # Errors
    /// Returns `ProtocolError::Transport` if the underlying client cannot
    /// be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProtocolError::Transport(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the receiver's raw public-key bytes.
    ///
    /// # Errors
    /// Timeouts map to `ProtocolError::Timeout`; every other failure,
    /// including non-2xx statuses, maps to `ProtocolError::Handshake`.
    #[instrument(skip(self))]
    pub async fn fetch_public_key(&self) -> Result<Vec<u8>> {
        let url = format!("{}{PUBLIC_KEY_PATH}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_handshake_error)?
            .error_for_status()
            .map_err(map_handshake_error)?;

        let bytes = response.bytes().await.map_err(map_handshake_error)?;
        debug!(len = bytes.len(), "Fetched public key");
        Ok(bytes.to_vec())
    }

    /// Post a sealed envelope and return the acknowledgement body.
    ///
    /// # Errors
    /// Timeouts map to `ProtocolError::Timeout`; every other failure maps
    /// to `ProtocolError::Transport`.
    #[instrument(skip(self, body), fields(record_id = body.id))]
    pub async fn post_envelope(&self, body: &JsonEnvelope) -> Result<String> {
        let url = format!("{}{TRANSFER_PATH}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?
            .error_for_status()
            .map_err(map_transport_error)?;

        response.text().await.map_err(map_transport_error)
    }
}

fn map_handshake_error(e: reqwest::Error) -> ProtocolError {
    if e.is_timeout() {
        ProtocolError::Timeout
    } else {
        ProtocolError::Handshake(e.to_string())
    }
}

fn map_transport_error(e: reqwest::Error) -> ProtocolError {
    if e.is_timeout() {
        ProtocolError::Timeout
    } else {
        ProtocolError::Transport(e.to_string())
    }
}

/// Handle to the embedded HTTP receiver thread.
pub struct HttpReceiver {
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl HttpReceiver {
    /// Address the receiver actually bound, useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Unblock the accept loop and join the serving thread.
    pub fn shutdown(mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Start the embedded HTTP receiver on its own thread.
///
/// # Errors
/// Returns `ProtocolError::Transport` if the listener cannot bind.
pub fn start_http_receiver(addr: &str, receiver: Arc<Receiver>) -> Result<HttpReceiver> {
    let server = Server::http(addr)
        .map_err(|e| ProtocolError::Transport(format!("HTTP receiver bind: {e}")))?;
    let server = Arc::new(server);
    info!(address = %addr, "HTTP receiver listening");

    let loop_server = server.clone();
    let handle = std::thread::spawn(move || {
        for request in loop_server.incoming_requests() {
            respond(&receiver, request);
        }
    });

    Ok(HttpReceiver {
        server,
        handle: Some(handle),
    })
}

fn respond(receiver: &Receiver, mut request: tiny_http::Request) {
    let url = request.url().to_string();
    let method = request.method().clone();
    debug!(%method, %url, "HTTP request");

    let response = match (&method, url.as_str()) {
        (Method::Get, PUBLIC_KEY_PATH) => {
            Response::from_data(receiver.public_key().to_vec()).boxed()
        }
        (Method::Post, TRANSFER_PATH) => {
            let mut body = String::new();
            match request.as_reader().read_to_string(&mut body) {
                Ok(_) => match receiver.handle_json_body(&body) {
                    Ok(record_id) => json_response(
                        200,
                        format!(r#"{{"status":"RECEIVED","id":{record_id}}}"#),
                    ),
                    Err(e) => {
                        warn!(error = %e, "Rejecting transfer body");
                        json_response(400, format!(r#"{{"error":"{e}"}}"#))
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Failed to read request body");
                    json_response(400, r#"{"error":"unreadable body"}"#.to_string())
                }
            }
        }
        _ => Response::from_string("not found").with_status_code(404).boxed(),
    };

    if let Err(e) = request.respond(response) {
        warn!(error = %e, "Failed to send HTTP response");
    }
}

fn json_response(status: u16, body: String) -> tiny_http::ResponseBox {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    response.boxed()
}
