//! MLLP stream framing.
//!
//! Each message travels as `<VT> payload <FS><CR>`: a single start byte,
//! the payload, then a two-byte trailer. Total overhead is exactly three
//! bytes. Deframing is permissive: markers are stripped only when both
//! ends are present, otherwise the input passes through unchanged and the
//! line-message layer validates the content.

use crate::error::Result;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Start-of-block marker, `<VT>`.
pub const START_BLOCK: u8 = 0x0B;

/// End-of-block marker, `<FS>`.
pub const END_BLOCK: u8 = 0x1C;

/// Trailer byte following the end marker, `<CR>`.
pub const TRAILER: u8 = 0x0D;

/// Wrap a payload in framing markers.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 3);
    framed.push(START_BLOCK);
    framed.extend_from_slice(payload);
    framed.push(END_BLOCK);
    framed.push(TRAILER);
    framed
}

/// Strip framing markers if and only if both ends are present.
///
/// Inputs without complete framing are returned unchanged; truncation is
/// detected by the caller when it decodes the content.
pub fn deframe(bytes: &[u8]) -> &[u8] {
    if bytes.len() >= 3
        && bytes[0] == START_BLOCK
        && bytes[bytes.len() - 2] == END_BLOCK
        && bytes[bytes.len() - 1] == TRAILER
    {
        &bytes[1..bytes.len() - 2]
    } else {
        bytes
    }
}

/// Tokio codec for framed messages over a byte stream.
///
/// The decoder buffers reads of arbitrary size until the two-byte trailer
/// sequence appears anywhere in the buffer, then deframes everything up to
/// and including it. When the stream closes before a trailer is seen, the
/// remaining buffer is deframed as-is so the caller can reject the
/// truncated content at the message layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct MllpCodec;

impl Decoder for MllpCodec {
    type Item = Vec<u8>;
    type Error = crate::error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(end) = find_trailer(src) else {
            return Ok(None);
        };

        let message = src.split_to(end + 2);
        Ok(Some(deframe(&message).to_vec()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Best effort: stream closed mid-message.
        let message = src.split_to(src.len());
        Ok(Some(deframe(&message).to_vec()))
    }
}

impl Encoder<Vec<u8>> for MllpCodec {
    type Error = crate::error::ProtocolError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + 3);
        dst.put_u8(START_BLOCK);
        dst.put_slice(&item);
        dst.put_u8(END_BLOCK);
        dst.put_u8(TRAILER);
        Ok(())
    }
}

/// Index of the end-block byte of the first trailer sequence, if any.
fn find_trailer(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|pair| pair == [END_BLOCK, TRAILER])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let payload = b"MSH|^~\\&|ClientApp";
        let framed = frame(payload);
        assert_eq!(framed.len(), payload.len() + 3);
        assert_eq!(deframe(&framed), payload);
    }

    #[test]
    fn roundtrip_empty() {
        let framed = frame(b"");
        assert_eq!(framed, vec![START_BLOCK, END_BLOCK, TRAILER]);
        assert_eq!(deframe(&framed), b"");
    }

    #[test]
    fn roundtrip_with_marker_bytes_as_data() {
        let payload = [START_BLOCK, b'x', END_BLOCK, TRAILER, b'y', END_BLOCK];
        let framed = frame(&payload);
        assert_eq!(deframe(&framed), payload);
    }

    #[test]
    fn unframed_input_passes_through() {
        assert_eq!(deframe(b"plain text"), b"plain text");
        assert_eq!(deframe(b""), b"");
        // Start marker without trailer: unchanged.
        assert_eq!(deframe(&[START_BLOCK, b'a']), [START_BLOCK, b'a']);
    }

    #[test]
    fn decoder_waits_for_trailer() {
        let mut codec = MllpCodec;
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&[START_BLOCK]);
        buf.extend_from_slice(b"partial");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[END_BLOCK, TRAILER]);
        let message = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(message, b"partial");
        assert!(buf.is_empty());
    }

    #[test]
    fn decoder_handles_back_to_back_messages() {
        let mut codec = MllpCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame(b"first"));
        buf.extend_from_slice(&frame(b"second"));

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"first");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"second");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_eof_yields_partial_buffer() {
        let mut codec = MllpCodec;
        let mut buf = BytesMut::from(&b"no trailer here"[..]);
        let message = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(message, b"no trailer here");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encoder_matches_frame() {
        let mut codec = MllpCodec;
        let mut buf = BytesMut::new();
        codec.encode(b"abc".to_vec(), &mut buf).unwrap();
        assert_eq!(&buf[..], frame(b"abc").as_slice());
    }
}
