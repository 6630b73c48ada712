//! Authenticated encryption for token versions 2 and 3.
//!
//! Sealed blob layout (before URL-safe base64 without padding):
//! ```text
//! [nonce:12][ciphertext:N][poly1305 tag:16]
//! ```
//!
//! The version tag (and, for version 3, the key id) is bound as associated
//! data, so a blob cannot be moved into a token of another version without
//! failing the integrity check.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::codec::TokenError;
use super::keys::SecretKey;

/// ChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Poly1305 authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypts `plaintext` under `key` and returns the base64 sealed blob.
///
/// # Errors
///
/// Returns [`TokenError::Encryption`] if the AEAD rejects the input.
pub fn seal(key: &SecretKey, aad: &[u8], plaintext: &[u8]) -> Result<String, TokenError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|_| TokenError::Encryption)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(blob))
}

/// Decrypts and authenticates a blob produced by [`seal`].
///
/// # Errors
///
/// - [`TokenError::MalformedToken`] if the text is not base64 or is too short
///   to hold a nonce and a tag.
/// - [`TokenError::TokenTampered`] if authentication fails (modified blob,
///   wrong key, or mismatched associated data).
pub fn open(key: &SecretKey, aad: &[u8], sealed: &str) -> Result<Vec<u8>, TokenError> {
    let blob = URL_SAFE_NO_PAD
        .decode(sealed)
        .map_err(|_| TokenError::MalformedToken("sealed payload is not valid base64".into()))?;

    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(TokenError::MalformedToken(format!(
            "sealed payload too short: {} bytes",
            blob.len()
        )));
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| TokenError::TokenTampered)
}

/// Parses the base64 key part of a version 2 token.
///
/// # Errors
///
/// Returns [`TokenError::MalformedToken`] if the text is not a base64
/// encoding of exactly 32 bytes.
pub fn parse_key(text: &str) -> Result<SecretKey, TokenError> {
    SecretKey::from_base64(text)
        .ok_or_else(|| TokenError::MalformedToken("embedded key is not a 32-byte base64 value".into()))
}
