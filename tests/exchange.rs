//! End-to-end exchange tests over real sockets.
//!
//! Each test stands up a receiver on localhost, drives a sender session
//! against it, and inspects the acknowledgement and the staged files.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use ecg_transport::core::format::{BinaryTextEncoding, PayloadFormat};
use ecg_transport::core::message::{HeaderSegment, LineMessage, MessageKind};
use ecg_transport::error::ProtocolError;
use ecg_transport::protocol::envelope::{self, JsonEnvelope, TransferRecord};
use ecg_transport::protocol::handshake::{KeyDerivation, PUBLIC_KEY_LEN};
use ecg_transport::protocol::session::{SessionState, SessionTransport, TransportSession};
use ecg_transport::service::receiver::Receiver;
use ecg_transport::transport::http::{start_http_receiver, HttpClient};
use ecg_transport::transport::mllp::{start_server_with_shutdown, MllpClient};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ecg-exchange-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn staged_files(dir: &Path, record_id: u64) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(&format!("_{record_id}.")))
        .collect()
}

fn default_receiver(dir: &Path) -> Arc<Receiver> {
    Arc::new(Receiver::new(
        KeyDerivation::HkdfSha256,
        BinaryTextEncoding::Base64,
        dir,
    ))
}

/// Spawn the framed server and block until it accepts connections.
async fn spawn_mllp_server(addr: &str, receiver: Arc<Receiver>) -> mpsc::Sender<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let listen_addr = addr.to_string();
    tokio::spawn(async move {
        let _ = start_server_with_shutdown(&listen_addr, receiver, shutdown_rx).await;
    });

    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return shutdown_tx;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server at {addr} never came up");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mllp_session_delivers_and_stages() {
    let dir = temp_dir("mllp-session");
    let addr = "127.0.0.1:25861";
    let shutdown = spawn_mllp_server(addr, default_receiver(&dir)).await;

    let mut session = TransportSession::new(SessionTransport::Mllp { addr: addr.into() })
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));

    let record = TransferRecord::new(201).patient("P201", "DOE^JANE");
    let plaintext = br#"{"samples":[120,121,119]}"#;
    let receipt = session.send_record(&record, plaintext, b"").await.unwrap();

    assert!(receipt.accepted);
    assert_eq!(receipt.record_id, 201);
    assert_eq!(session.state(), SessionState::Acked);

    let staged = staged_files(&dir, 201);
    assert!(staged.iter().any(|name| name.ends_with(".enc")));
    let decrypted = staged
        .iter()
        .find(|name| name.ends_with(".json"))
        .expect("decrypted record staged");
    let contents = std::fs::read(dir.join(decrypted)).unwrap();
    assert_eq!(contents, plaintext);

    let _ = shutdown.send(()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mllp_session_chunks_large_records() {
    let dir = temp_dir("mllp-chunked");
    let addr = "127.0.0.1:25862";
    let shutdown = spawn_mllp_server(addr, default_receiver(&dir)).await;

    let mut session = TransportSession::new(SessionTransport::Mllp { addr: addr.into() })
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(10));

    // Large enough that the sealed ciphertext spans several chunk segments.
    let plaintext: Vec<u8> = (0..20_000).map(|i| (i % 251) as u8).collect();
    let record = TransferRecord::new(202);
    let receipt = session.send_record(&record, &plaintext, b"").await.unwrap();
    assert!(receipt.accepted);

    let staged = staged_files(&dir, 202);
    let decrypted = staged
        .iter()
        .find(|name| name.ends_with(".json"))
        .expect("decrypted record staged");
    let contents = std::fs::read(dir.join(decrypted)).unwrap();
    assert_eq!(contents, plaintext);

    let _ = shutdown.send(()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mllp_malformed_transfer_gets_error_ack() {
    let dir = temp_dir("mllp-error-ack");
    let addr = "127.0.0.1:25863";
    let shutdown = spawn_mllp_server(addr, default_receiver(&dir)).await;

    let mut client = MllpClient::connect(addr, Duration::from_secs(5), Duration::from_secs(5))
        .await
        .unwrap();

    // An observation message with no envelope fields at all.
    let header = HeaderSegment::new(MessageKind::ObservationResult, "77").unwrap();
    let reply = client.exchange(&LineMessage::new(header)).await.unwrap();

    assert_eq!(reply.message_kind(), Some(MessageKind::Acknowledgement));
    assert!(!reply.is_accepted());

    let _ = shutdown.send(()).await;
}

#[tokio::test]
async fn unresponsive_peer_times_out() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    // Accept and hold the connection open without ever replying.
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut sink = [0u8; 1024];
            while let Ok(n) = socket.read(&mut sink).await {
                if n == 0 {
                    break;
                }
            }
        }
    });

    let mut client = MllpClient::connect(&addr, Duration::from_secs(2), Duration::from_secs(1))
        .await
        .unwrap();

    let header = HeaderSegment::new(MessageKind::Query, "1").unwrap();
    let result = client.exchange(&LineMessage::new(header)).await;
    assert!(matches!(result, Err(ProtocolError::Timeout)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_session_delivers_and_stages() {
    let dir = temp_dir("http-session");
    let receiver = default_receiver(&dir);
    let http = start_http_receiver("127.0.0.1:0", receiver.clone()).unwrap();
    let base_url = format!("http://{}", http.local_addr().unwrap());

    let mut session = TransportSession::new(SessionTransport::Http {
        base_url: base_url.clone(),
    })
    .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));

    let record = TransferRecord::new(301);
    let plaintext = br#"{"samples":[99,98,97]}"#;
    let receipt = session.send_record(&record, plaintext, b"").await.unwrap();

    assert!(receipt.accepted);
    assert_eq!(session.state(), SessionState::Acked);

    let staged = staged_files(&dir, 301);
    assert!(staged.iter().any(|name| name.ends_with(".enc")));
    let decrypted = staged
        .iter()
        .find(|name| name.ends_with(".json"))
        .expect("decrypted record staged");
    let contents = std::fs::read(dir.join(decrypted)).unwrap();
    assert_eq!(contents, plaintext);

    http.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_serves_the_receiver_public_key() {
    let dir = temp_dir("http-pubkey");
    let receiver = default_receiver(&dir);
    let http = start_http_receiver("127.0.0.1:0", receiver.clone()).unwrap();
    let base_url = format!("http://{}", http.local_addr().unwrap());

    let client = HttpClient::new(&base_url, Duration::from_secs(5)).unwrap();
    let key = client.fetch_public_key().await.unwrap();
    assert_eq!(key.len(), PUBLIC_KEY_LEN);
    assert_eq!(key, receiver.public_key());

    http.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_ack_means_receipt_not_decryption() {
    let dir = temp_dir("http-tampered");
    let receiver = default_receiver(&dir);
    let http = start_http_receiver("127.0.0.1:0", receiver.clone()).unwrap();
    let base_url = format!("http://{}", http.local_addr().unwrap());

    let client = HttpClient::new(&base_url, Duration::from_secs(5)).unwrap();
    let public_key = client.fetch_public_key().await.unwrap();

    let sealed = envelope::seal(&public_key, b"tampered en route", b"", KeyDerivation::HkdfSha256)
        .unwrap();
    let mut body = JsonEnvelope::from_envelope(&sealed, 302, BinaryTextEncoding::Base64);

    // Corrupt the sealed bytes after sealing; the receiver still acks.
    let mut raw = BinaryTextEncoding::Base64.decode(&body.ciphertext).unwrap();
    raw[0] ^= 0x01;
    body.ciphertext = BinaryTextEncoding::Base64.encode(&raw);

    let ack = client.post_envelope(&body).await.unwrap();
    assert!(ack.contains("RECEIVED"));

    // The sealed blob is staged, the decrypted record is not.
    let staged = staged_files(&dir, 302);
    assert!(staged.iter().any(|name| name.ends_with(".enc")));
    assert!(!staged.iter().any(|name| name.ends_with(".json")));

    http.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hex_encoding_works_end_to_end() {
    let dir = temp_dir("http-hex");
    let receiver = Arc::new(Receiver::new(
        KeyDerivation::HkdfSha256,
        BinaryTextEncoding::Hex,
        &dir,
    ));
    let http = start_http_receiver("127.0.0.1:0", receiver.clone()).unwrap();
    let base_url = format!("http://{}", http.local_addr().unwrap());

    let mut session = TransportSession::new(SessionTransport::Http { base_url })
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
        .binary_encoding(BinaryTextEncoding::Hex)
        .payload_format(PayloadFormat::Json);

    let record = TransferRecord::new(303);
    let receipt = session
        .send_record(&record, br#"{"lead":"II"}"#, b"")
        .await
        .unwrap();
    assert!(receipt.accepted);

    let staged = staged_files(&dir, 303);
    assert!(staged.iter().any(|name| name.ends_with(".json")));

    http.shutdown();
}
