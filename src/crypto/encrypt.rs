//! Thin AES-256-GCM wrap for bundle payloads.
//!
//! The bundle id is bound in as AAD so a ciphertext cannot be swapped
//! between bundles. Ciphertexts carry the GCM tag appended (combined
//! mode). Key material is recorded alongside the ciphertext in the
//! bundle's encryption envelope; key custody is the caller's concern.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

/// Content encryption key (32 bytes for AES-256)
pub type ContentKey = [u8; 32];

/// Nonce size for AES-GCM (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// AEAD algorithm identifier recorded in encryption envelopes
pub const AEAD_ALGORITHM: &str = "AES-256-GCM";

/// Error type for encryption operations
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid payload format")]
    InvalidPayloadFormat,
}

/// Generate a random content key
pub fn generate_key() -> ContentKey {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt a payload; the returned ciphertext includes the GCM tag.
pub fn seal(
    key: &ContentKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptionFailed)
}

/// Decrypt a combined-mode ciphertext produced by [`seal`].
pub fn open(
    key: &ContentKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptionFailed)
}

/// Encode bytes as base64url without padding
pub fn base64_url_encode(data: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, data)
}

/// Decode base64url bytes, accepting padded or unpadded input
pub fn base64_url_decode(s: &str) -> Result<Vec<u8>, EncryptionError> {
    base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, s)
        .or_else(|_| base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE, s))
        .map_err(|_| EncryptionError::InvalidPayloadFormat)
}
