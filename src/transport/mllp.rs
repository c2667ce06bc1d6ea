//! Framed TCP transport for line messages.
//!
//! The client side opens one connection per exchange and speaks strict
//! request/response: send a framed message, await exactly one framed reply
//! within the response timeout. The server side is an async accept loop
//! with per-connection tasks, an active-connection count, and a graceful
//! drain on shutdown.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::core::framing::MllpCodec;
use crate::core::message::{DecodedMessage, LineMessage};
use crate::error::{ProtocolError, Result};
use crate::service::receiver::Receiver;
use crate::utils::timeout::{with_timeout_error, SHUTDOWN_TIMEOUT};

/// Conventional port for the framed line-message transport.
pub const DEFAULT_PORT: u16 = 2575;

/// One client connection speaking framed request/response.
pub struct MllpClient {
    framed: Framed<TcpStream, MllpCodec>,
    response_timeout: Duration,
}

impl MllpClient {
    /// Connect with a bounded connect timeout.
    ///
    /// # Errors
    /// Returns `ProtocolError::ConnectionTimeout` when the connect does not
    /// complete in time, or the underlying I/O error.
    #[instrument(skip(connect_timeout, response_timeout))]
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;

        debug!(peer = %addr, "Connected");
        Ok(Self {
            framed: Framed::new(stream, MllpCodec),
            response_timeout,
        })
    }

    /// Send one message and await one framed reply.
    ///
    /// # Errors
    /// Returns `ProtocolError::Timeout` when no reply arrives in time,
    /// `ProtocolError::ConnectionClosed` when the peer hangs up first, and
    /// decode errors for replies that are not valid line messages.
    pub async fn exchange(&mut self, message: &LineMessage) -> Result<DecodedMessage> {
        self.framed.send(message.encode().into_bytes()).await?;

        let reply = with_timeout_error(
            async {
                self.framed
                    .next()
                    .await
                    .ok_or(ProtocolError::ConnectionClosed)?
            },
            self.response_timeout,
        )
        .await?;

        let text = String::from_utf8(reply)
            .map_err(|e| ProtocolError::MalformedMessage(format!("reply is not UTF-8: {e}")))?;
        DecodedMessage::decode(&text)
    }
}

/// Start the server with a ctrl-c shutdown handler.
///
/// # Errors
/// Returns I/O errors from binding the listener.
#[instrument(skip(receiver))]
pub async fn start_server(addr: &str, receiver: Arc<Receiver>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(addr, receiver, shutdown_rx).await
}

/// Start the server with an external shutdown channel.
///
/// Each accepted connection is served on its own task; inbound frames are
/// dispatched to the receiver and its reply (if any) is framed back. On
/// shutdown the loop drains active connections for a bounded period before
/// returning.
///
/// # Errors
/// Returns I/O errors from binding the listener.
#[instrument(skip(receiver, shutdown_rx))]
pub async fn start_server_with_shutdown(
    addr: &str,
    receiver: Arc<Receiver>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Listening for framed line messages");

    let active_connections = Arc::new(Mutex::new(0u32));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server. Waiting for connections to close...");

                let timeout = tokio::time::sleep(SHUTDOWN_TIMEOUT);
                tokio::pin!(timeout);

                loop {
                    tokio::select! {
                        _ = &mut timeout => {
                            warn!("Shutdown timeout reached, forcing exit");
                            break;
                        }
                        _ = tokio::time::sleep(Duration::from_millis(500)) => {
                            let connections = *active_connections.lock().await;
                            info!(connections = %connections, "Waiting for connections to close");
                            if connections == 0 {
                                info!("All connections closed, shutting down");
                                break;
                            }
                        }
                    }
                }

                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection established");
                        let receiver = receiver.clone();
                        let active_connections = active_connections.clone();

                        {
                            let mut count = active_connections.lock().await;
                            *count += 1;
                        }

                        tokio::spawn(async move {
                            let mut framed = Framed::new(stream, MllpCodec);

                            while let Some(Ok(frame)) = framed.next().await {
                                debug!(bytes = frame.len(), "Frame received");

                                if let Some(reply) = receiver.handle_frame(&frame) {
                                    if let Err(e) = framed.send(reply).await {
                                        warn!(peer = %peer, error = %e, "Failed to send reply");
                                        break;
                                    }
                                }
                            }

                            let mut count = active_connections.lock().await;
                            *count -= 1;
                            debug!(peer = %peer, "Connection closed");
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}
