//! Wire-level edge cases exercised through the receiver dispatch path.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::{Path, PathBuf};

use ecg_transport::core::format::{BinaryTextEncoding, PayloadFormat};
use ecg_transport::core::message::{DecodedMessage, HeaderSegment, LineMessage, MessageKind};
use ecg_transport::protocol::envelope::{self, TransferRecord};
use ecg_transport::protocol::handshake::KeyDerivation;
use ecg_transport::service::receiver::Receiver;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ecg-edge-{name}-{}", std::process::id()));
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

fn sealed_transfer(receiver: &Receiver, record_id: u64, plaintext: &[u8]) -> String {
    let sealed = envelope::seal(
        receiver.public_key(),
        plaintext,
        b"",
        KeyDerivation::HkdfSha256,
    )
    .unwrap();
    envelope::to_transfer_message(
        &sealed,
        &TransferRecord::new(record_id),
        PayloadFormat::Json,
        BinaryTextEncoding::Base64,
    )
    .unwrap()
    .encode()
}

#[test]
fn derivation_mismatch_is_acked_but_not_opened() {
    let dir = temp_dir("derivation-mismatch");
    let receiver = Receiver::new(KeyDerivation::LegacyTruncate, BinaryTextEncoding::Base64, &dir);

    // Sender derives with HKDF, receiver truncates. The transfer is still
    // received and staged; only the open step fails.
    let transfer = sealed_transfer(&receiver, 401, b"{}");
    let reply = receiver.handle_frame(transfer.as_bytes()).unwrap();
    let decoded = DecodedMessage::decode(std::str::from_utf8(&reply).unwrap()).unwrap();
    assert!(decoded.is_accepted());

    let staged = staged_files(&dir, 401);
    assert!(staged.iter().any(|name| name.ends_with(".enc")));
    assert!(!staged.iter().any(|name| name.ends_with(".json")));
}

#[test]
fn missing_chunk_on_the_wire_is_rejected() {
    let dir = temp_dir("chunk-gap");
    let receiver = Receiver::new(KeyDerivation::HkdfSha256, BinaryTextEncoding::Base64, &dir);

    let plaintext: Vec<u8> = (0..20_000).map(|i| (i % 251) as u8).collect();
    let transfer = sealed_transfer(&receiver, 402, &plaintext);

    // Drop the second chunk segment from the encoded message.
    let gapped: String = transfer
        .split('\r')
        .filter(|line| !line.contains("ECG_CHUNK^2"))
        .collect::<Vec<_>>()
        .join("\r");
    assert_ne!(gapped, transfer);

    let reply = receiver.handle_frame(gapped.as_bytes()).unwrap();
    let decoded = DecodedMessage::decode(std::str::from_utf8(&reply).unwrap()).unwrap();
    assert_eq!(decoded.message_kind(), Some(MessageKind::Acknowledgement));
    assert!(!decoded.is_accepted());

    // Nothing was staged for the rejected transfer.
    assert!(staged_files(&dir, 402).is_empty());
}

#[test]
fn tampered_ciphertext_is_acked_but_not_opened() {
    let dir = temp_dir("tampered-wire");
    let receiver = Receiver::new(KeyDerivation::HkdfSha256, BinaryTextEncoding::Base64, &dir);

    let transfer = sealed_transfer(&receiver, 403, b"{\"beat\":1}");

    // Flip the first character of the base64 ciphertext value. The field
    // still decodes, so the transfer is received; authentication fails.
    let tampered: String = transfer
        .split('\r')
        .map(|line| {
            if !line.contains("ECG_CIPHERTEXT_B64") {
                return line.to_string();
            }
            let mut fields: Vec<String> = line.split('|').map(str::to_string).collect();
            let value = &fields[5];
            let replacement = if value.starts_with('A') { "B" } else { "A" };
            fields[5] = format!("{replacement}{}", &value[1..]);
            fields.join("|")
        })
        .collect::<Vec<_>>()
        .join("\r");
    assert_ne!(tampered, transfer);

    let reply = receiver.handle_frame(tampered.as_bytes()).unwrap();
    let decoded = DecodedMessage::decode(std::str::from_utf8(&reply).unwrap()).unwrap();
    assert!(decoded.is_accepted());

    let staged = staged_files(&dir, 403);
    assert!(staged.iter().any(|name| name.ends_with(".enc")));
    assert!(!staged.iter().any(|name| name.ends_with(".json")));
}

#[test]
fn unhandled_message_kinds_get_no_reply() {
    let dir = temp_dir("ignored-kind");
    let receiver = Receiver::new(KeyDerivation::HkdfSha256, BinaryTextEncoding::Base64, &dir);

    let header = HeaderSegment::new(MessageKind::Acknowledgement, "55").unwrap();
    let message = LineMessage::new(header).encode();
    assert!(receiver.handle_frame(message.as_bytes()).is_none());
}
