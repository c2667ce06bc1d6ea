//! Staging-directory persistence.
//!
//! Sealed blobs and decrypted records land in a staging directory under
//! timestamp-plus-identifier names, so concurrent sessions never collide
//! on a filename and a plain file server can expose the directory for
//! out-of-band retrieval.

use crate::core::format::PayloadFormat;
use crate::error::Result;
use crate::utils::time;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write a sealed ciphertext blob as `ecg_<timestamp>_<id>.enc`.
///
/// Creates the staging directory if it does not exist yet.
pub fn stage_ciphertext(dir: &Path, record_id: u64, blob: &[u8]) -> Result<PathBuf> {
    let path = unique_path(dir, record_id, "enc")?;
    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, blob)?;
    debug!(path = %path.display(), bytes = blob.len(), "Staged ciphertext blob");
    Ok(path)
}

/// Write a decrypted record as `ecg_<timestamp>_<id>.<json|xml>`.
pub fn stage_record(
    dir: &Path,
    record_id: u64,
    format: PayloadFormat,
    plaintext: &[u8],
) -> Result<PathBuf> {
    let path = unique_path(dir, record_id, format.extension())?;
    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, plaintext)?;
    debug!(path = %path.display(), bytes = plaintext.len(), "Staged decrypted record");
    Ok(path)
}

fn unique_path(dir: &Path, record_id: u64, extension: &str) -> Result<PathBuf> {
    let stamp = time::compact_timestamp()?;
    Ok(dir.join(format!("ecg_{stamp}_{record_id}.{extension}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stages_blob_with_expected_name() {
        let dir = std::env::temp_dir().join(format!("ecg-staging-{}", std::process::id()));
        let path = stage_ciphertext(&dir, 7, b"\x01\x02\x03").unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("ecg_"));
        assert!(name.ends_with("_7.enc"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x01\x02\x03");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
