//! Ciphertext chunking for the line-message transport.
//!
//! A sealed payload larger than a practical line fits nowhere in a single
//! observation field, so the base64 text of the ciphertext is split into
//! fixed-size slices, one observation segment per slice, tagged
//! `ECG_CHUNK^<n>` with a 1-based ascending sequence number. Splitting the
//! encoded text (rather than the raw bytes) keeps the concatenation of
//! slices valid base64, so reassembly is concatenate-then-decode.
//!
//! Reassembly fails closed: any missing index in the contiguous range
//! `[1, max]` rejects the whole message.

use crate::core::format::BinaryTextEncoding;
use crate::core::message::{tags, ObservationSegment};
use crate::error::{constants, ProtocolError, Result};

/// Characters of base64 text per chunk. 5336 encoded characters cover
/// 4002 raw bytes, comfortably inside the transport's practical line length.
pub const CHUNK_TEXT_LEN: usize = 5336;

/// Whether a ciphertext of this encoded length needs chunking.
pub fn needs_chunking(encoded_len: usize) -> bool {
    encoded_len > CHUNK_TEXT_LEN
}

/// Split base64 text into fixed-size slices, preserving order.
///
/// Base64 is ASCII, so slicing on byte boundaries is safe.
pub fn split_text(encoded: &str) -> Vec<&str> {
    encoded
        .as_bytes()
        .chunks(CHUNK_TEXT_LEN)
        .map(|slice| std::str::from_utf8(slice).unwrap_or_default())
        .collect()
}

/// Build the ordered chunk observation segments for an encoded ciphertext.
///
/// Set ids continue from `first_set_id`; identifiers carry the 1-based
/// sequence number.
pub fn chunk_segments(encoded: &str, first_set_id: u32) -> Vec<ObservationSegment> {
    split_text(encoded)
        .into_iter()
        .enumerate()
        .map(|(i, slice)| {
            ObservationSegment::text(
                first_set_id + i as u32,
                format!("{}^{}", tags::CHUNK, i + 1),
                slice,
            )
        })
        .collect()
}

/// Reassemble chunk observations back into ciphertext bytes.
///
/// Accepts `(identifier, value)` pairs in any order, keeps those whose
/// identifier is `ECG_CHUNK^<n>`, sorts by `n`, verifies the gapless
/// `[1, max]` range, concatenates, and base64-decodes.
pub fn reassemble<'a>(
    observations: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<Option<Vec<u8>>> {
    let prefix = format!("{}^", tags::CHUNK);
    let mut chunks: Vec<(u64, &str)> = Vec::new();

    for (identifier, value) in observations {
        let Some(raw_index) = identifier.strip_prefix(&prefix) else {
            continue;
        };
        // A chunk tag may carry trailing components after the index.
        let raw_index = raw_index.split('^').next().unwrap_or(raw_index);
        let index: u64 = raw_index.parse().map_err(|_| {
            ProtocolError::ChunkReassembly(format!(
                "{}: '{raw_index}'",
                constants::ERR_CHUNK_INDEX
            ))
        })?;
        if index == 0 {
            return Err(ProtocolError::ChunkReassembly(format!(
                "{}: '0'",
                constants::ERR_CHUNK_INDEX
            )));
        }
        chunks.push((index, value));
    }

    if chunks.is_empty() {
        return Ok(None);
    }

    chunks.sort_by_key(|(index, _)| *index);

    let mut text = String::new();
    for (expected, (index, value)) in (1u64..).zip(chunks.iter()) {
        if *index != expected {
            return Err(ProtocolError::ChunkReassembly(format!(
                "{}: expected {expected}, found {index}",
                constants::ERR_CHUNK_GAP
            )));
        }
        text.push_str(value);
    }

    BinaryTextEncoding::Base64.decode(&text).map(Some)
}
