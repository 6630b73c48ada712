//! Symmetric key material for sealed tokens.
//!
//! Version 2 tokens carry their own single-use [`SecretKey`].  Version 3 tokens
//! are sealed under the active key of a [`KeyProvider`] that the caller injects
//! into the [`TokenCodec`](crate::TokenCodec); the token records which key id
//! was used so a rotated keyring can still open older tokens.
//!
//! Keys are written once when the process starts and are read-only afterwards.
//! Rotation builds a new [`Keyring`] value instead of mutating a shared one.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Length of a ChaCha20-Poly1305 key in bytes.
pub const KEY_LEN: usize = 32;

/// Identifier of a key inside a [`Keyring`].
pub type KeyId = u32;

/// A 256-bit symmetric key.
///
/// `Debug` output is redacted so keys never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Generates a fresh key from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice, or `None` if it is not exactly [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; KEY_LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// URL-safe base64 (no padding) text form.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parses the text form produced by [`SecretKey::to_base64`].
    pub fn from_base64(text: &str) -> Option<Self> {
        URL_SAFE_NO_PAD
            .decode(text)
            .ok()
            .and_then(|bytes| Self::from_slice(&bytes))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

// ── Key provider seam ─────────────────────────────────────────────────────────

/// Source of process-held keys for version 3 tokens.
///
/// The production implementation is [`Keyring`]; tests inject mocks.
#[cfg_attr(test, mockall::automock)]
pub trait KeyProvider: Send + Sync {
    /// The key new tokens are sealed with, or `None` if no key is configured.
    fn active_key(&self) -> Option<(KeyId, SecretKey)>;

    /// Looks up a key by id for decoding.
    fn key(&self, id: KeyId) -> Option<SecretKey>;
}

// ── Keyring ───────────────────────────────────────────────────────────────────

/// Errors parsing the text form of a [`Keyring`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyringError {
    /// A line is not `<id>:<base64 key>`.
    #[error("line {line}: expected `<id>:<base64 key>`")]
    InvalidLine { line: usize },

    /// The same key id appears twice.
    #[error("duplicate key id {0}")]
    DuplicateId(KeyId),

    /// The newest key already has the largest possible id.
    #[error("key id {0} is the last available id; cannot rotate")]
    IdExhausted(KeyId),
}

/// An ordered set of keys; the last one is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyring {
    keys: Vec<(KeyId, SecretKey)>,
}

impl Keyring {
    /// Creates a keyring holding a single freshly generated key with id 1.
    pub fn generate() -> Self {
        Self {
            keys: vec![(1, SecretKey::generate())],
        }
    }

    /// Creates a keyring from explicit keys; the last entry becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::DuplicateId`] if two entries share an id.
    pub fn from_keys(keys: Vec<(KeyId, SecretKey)>) -> Result<Self, KeyringError> {
        for (i, (id, _)) in keys.iter().enumerate() {
            if keys[..i].iter().any(|(other, _)| other == id) {
                return Err(KeyringError::DuplicateId(*id));
            }
        }
        Ok(Self { keys })
    }

    /// Returns a new keyring with one more generated key, which becomes active.
    ///
    /// Older keys are kept so tokens sealed before the rotation still open.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::IdExhausted`] when the largest id is `KeyId::MAX`.
    pub fn rotated(&self) -> Result<Self, KeyringError> {
        let max_id = self.keys.iter().map(|(id, _)| *id).max().unwrap_or(0);
        let next_id = max_id
            .checked_add(1)
            .ok_or(KeyringError::IdExhausted(max_id))?;
        let mut keys = self.keys.clone();
        keys.push((next_id, SecretKey::generate()));
        Ok(Self { keys })
    }

    /// Returns a new keyring keeping only the `count` most recent keys.
    pub fn retain_latest(&self, count: usize) -> Self {
        let skip = self.keys.len().saturating_sub(count);
        Self {
            keys: self.keys[skip..].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Id of the active key.
    pub fn active_id(&self) -> Option<KeyId> {
        self.keys.last().map(|(id, _)| *id)
    }

    /// Serializes to one `<id>:<base64 key>` line per key, active key last.
    pub fn to_text(&self) -> String {
        self.keys
            .iter()
            .map(|(id, key)| format!("{id}:{}\n", key.to_base64()))
            .collect()
    }

    /// Parses the text form produced by [`Keyring::to_text`].
    ///
    /// Blank lines and lines starting with `#` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidLine`] for a malformed line (1-based
    /// numbering) and [`KeyringError::DuplicateId`] for repeated ids.
    pub fn from_text(text: &str) -> Result<Self, KeyringError> {
        let mut keys = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = KeyringError::InvalidLine { line: index + 1 };
            let (id, key) = line.split_once(':').ok_or_else(|| invalid.clone())?;
            let id: KeyId = id.trim().parse().map_err(|_| invalid.clone())?;
            let key = SecretKey::from_base64(key.trim()).ok_or(invalid)?;
            keys.push((id, key));
        }
        Self::from_keys(keys)
    }
}

impl KeyProvider for Keyring {
    fn active_key(&self) -> Option<(KeyId, SecretKey)> {
        self.keys.last().cloned()
    }

    fn key(&self, id: KeyId) -> Option<SecretKey> {
        self.keys
            .iter()
            .find(|(key_id, _)| *key_id == id)
            .map(|(_, key)| key.clone())
    }
}
