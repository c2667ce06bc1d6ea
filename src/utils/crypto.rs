//! Ascon-128 authenticated encryption.
//!
//! Thin wrapper over the AEAD primitive: 128-bit key, 128-bit nonce,
//! ciphertext followed by a 16-byte authentication tag.
//!
//! The authentication check is constant-time inside the primitive; on
//! failure no plaintext is returned.

use crate::error::{ProtocolError, Result};
use ascon_aead::aead::{Aead, KeyInit, Payload};
use ascon_aead::{Ascon128, Key, Nonce};
use rand_core::{OsRng, RngCore};

/// Symmetric key length in bytes (Ascon-128).
pub const KEY_LEN: usize = 16;

/// Nonce length in bytes (Ascon-128).
pub const NONCE_LEN: usize = 16;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// AEAD engine bound to one symmetric key.
pub struct Crypto {
    cipher: Ascon128,
}

impl Crypto {
    /// Build an engine from a 16-byte key.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Ascon128::new(Key::<Ascon128>::from_slice(key)),
        }
    }

    /// Generate a fresh 16-byte nonce from the OS CSPRNG.
    pub fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// Encrypt and authenticate `plaintext`, binding `associated_data`.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        nonce: &[u8; NONCE_LEN],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(
                Nonce::<Ascon128>::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| {
                ProtocolError::Custom(crate::error::constants::ERR_ENCRYPTION_FAILED.into())
            })
    }

    /// Decrypt and verify `ciphertext`; fails without partial plaintext if
    /// the tag does not verify.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8; NONCE_LEN],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(
                Nonce::<Ascon128>::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| ProtocolError::Authentication)
    }
}
