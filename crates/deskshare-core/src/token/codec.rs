//! The token codec: descriptor ⇄ versioned token string.
//!
//! Every scheme serializes the descriptor the same way before its cipher runs:
//!
//! ```text
//! <host>,<mode code>,<credential or empty>
//! ```
//!
//! Decoding splits on the separator and requires exactly three fields.  Fields
//! are never reconstructed by removing one field's text from another, so a
//! host that happens to contain the credential as a substring decodes intact.
//!
//! # Error mapping
//!
//! | Failure                                          | Error                |
//! |--------------------------------------------------|----------------------|
//! | unknown version tag, wrong field/part count      | `MalformedToken`     |
//! | bad base64, unknown key id, non-UTF-8 plaintext  | `MalformedToken`     |
//! | AEAD integrity check failed                      | `TokenTampered`      |
//! | empty/invalid host, unknown mode, bad credential | `InvalidDescriptor`  |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::envelope::{Token, TokenVersion, VERSION_SEPARATOR};
use super::keys::{KeyId, KeyProvider, SecretKey};
use super::sealed;
use super::substitution::SubstitutionCipher;
use crate::domain::endpoint::{DescriptorError, EndpointDescriptor, FIELD_SEPARATOR};

/// Number of fields in a serialized descriptor.
const DESCRIPTOR_ARITY: usize = 3;

/// Errors produced while encoding or decoding tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The descriptor (given to `encode`, or recovered by `decode`) is not valid.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    /// The token is structurally wrong: unknown version, wrong arity, bad encoding.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// An authenticated token failed its integrity check.
    #[error("token failed its integrity check")]
    TokenTampered,

    /// A process-keyring token was requested but no key provider is configured.
    #[error("no key available for version {0} tokens")]
    KeyUnavailable(u8),

    /// The AEAD refused to encrypt.
    #[error("token encryption failed")]
    Encryption,
}

// ── Scheme ────────────────────────────────────────────────────────────────────

/// Encoding scheme selectable when minting a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    /// Version 1: keyless substitution.  Obfuscation only.
    Substitution,
    /// Version 2: authenticated encryption with a single-use key inside the token.
    SealedEphemeral,
    /// Version 3: authenticated encryption under the injected keyring.
    SealedKeyring,
}

impl Scheme {
    pub fn version(self) -> TokenVersion {
        match self {
            Scheme::Substitution => TokenVersion::Substitution,
            Scheme::SealedEphemeral => TokenVersion::SealedEphemeral,
            Scheme::SealedKeyring => TokenVersion::SealedKeyring,
        }
    }

    /// Whether tokens of this scheme detect modification.
    pub fn is_authenticated(self) -> bool {
        !matches!(self, Scheme::Substitution)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Substitution => "substitution",
            Scheme::SealedEphemeral => "sealed-ephemeral",
            Scheme::SealedKeyring => "sealed-keyring",
        })
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substitution" | "legacy" | "1" => Ok(Scheme::Substitution),
            "sealed-ephemeral" | "sealed" | "ephemeral" | "2" => Ok(Scheme::SealedEphemeral),
            "sealed-keyring" | "keyring" | "3" => Ok(Scheme::SealedKeyring),
            other => Err(format!(
                "unknown scheme {other:?} (expected substitution, sealed-ephemeral or sealed-keyring)"
            )),
        }
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Encodes and decodes share tokens.
///
/// The codec is cheap to clone and holds no mutable state: the substitution
/// shift and the optional key provider are fixed at construction.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use deskshare_core::{AccessMode, EndpointDescriptor, Keyring, Scheme, TokenCodec};
///
/// let codec = TokenCodec::new().with_key_provider(Arc::new(Keyring::generate()));
/// let d = EndpointDescriptor::new("desk.lan", AccessMode::ViewOnly).unwrap();
///
/// let token = codec.encode(&d, Scheme::SealedKeyring).unwrap();
/// assert!(token.starts_with("3:"));
/// assert_eq!(codec.decode(&token).unwrap(), d);
/// ```
#[derive(Clone, Default)]
pub struct TokenCodec {
    substitution: SubstitutionCipher,
    keys: Option<Arc<dyn KeyProvider>>,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("substitution_shift", &self.substitution.shift())
            .field("has_key_provider", &self.keys.is_some())
            .finish()
    }
}

impl TokenCodec {
    /// A codec with the default substitution shift and no key provider.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_substitution_shift(mut self, shift: i32) -> Self {
        self.substitution = SubstitutionCipher::new(shift);
        self
    }

    /// Injects the key source used for version 3 tokens.
    pub fn with_key_provider(mut self, keys: Arc<dyn KeyProvider>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Encodes `descriptor` with `scheme` and returns the token text.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InvalidDescriptor`] if the descriptor fails validation.
    /// - [`TokenError::KeyUnavailable`] for [`Scheme::SealedKeyring`] without a
    ///   key provider (or with an empty one).  The codec never substitutes a
    ///   weaker scheme.
    pub fn encode(&self, descriptor: &EndpointDescriptor, scheme: Scheme) -> Result<String, TokenError> {
        self.encode_token(descriptor, scheme).map(|t| t.to_string())
    }

    /// Like [`TokenCodec::encode`] but returns the parsed [`Token`].
    pub fn encode_token(&self, descriptor: &EndpointDescriptor, scheme: Scheme) -> Result<Token, TokenError> {
        descriptor.validate()?;
        let plaintext = descriptor.to_fields();
        let version = scheme.version();

        let payload = match scheme {
            Scheme::Substitution => self.substitution.apply(&plaintext),
            Scheme::SealedEphemeral => {
                let key = SecretKey::generate();
                let sealed = sealed::seal(&key, &associated_data(version, None), plaintext.as_bytes())?;
                format!("{sealed}{VERSION_SEPARATOR}{}", key.to_base64())
            }
            Scheme::SealedKeyring => {
                let (key_id, key) = self
                    .keys
                    .as_ref()
                    .and_then(|keys| keys.active_key())
                    .ok_or(TokenError::KeyUnavailable(version.tag()))?;
                let sealed =
                    sealed::seal(&key, &associated_data(version, Some(key_id)), plaintext.as_bytes())?;
                format!("{key_id}{VERSION_SEPARATOR}{sealed}")
            }
        };

        debug!(version = version.tag(), "encoded share token");
        Ok(Token::new(version, payload))
    }

    /// Decodes token text back into a descriptor.
    ///
    /// # Errors
    ///
    /// See the module-level error mapping table.
    pub fn decode(&self, token: &str) -> Result<EndpointDescriptor, TokenError> {
        self.decode_token(&Token::parse(token)?)
    }

    /// Decodes an already-parsed [`Token`].
    pub fn decode_token(&self, token: &Token) -> Result<EndpointDescriptor, TokenError> {
        let version = token.version();
        let parts = token.payload_parts()?;
        debug!(version = version.tag(), "decoding share token");

        let plaintext = match version {
            TokenVersion::Substitution => self.substitution.reverse(parts[0]),
            TokenVersion::SealedEphemeral => {
                let key = sealed::parse_key(parts[1])?;
                let bytes = sealed::open(&key, &associated_data(version, None), parts[0])?;
                into_utf8(bytes)?
            }
            TokenVersion::SealedKeyring => {
                let key_id: KeyId = parts[0]
                    .parse()
                    .map_err(|_| TokenError::MalformedToken("key id is not a number".into()))?;
                let key = self
                    .keys
                    .as_ref()
                    .ok_or(TokenError::KeyUnavailable(version.tag()))?
                    .key(key_id)
                    .ok_or_else(|| TokenError::MalformedToken(format!("unknown key id {key_id}")))?;
                let bytes = sealed::open(&key, &associated_data(version, Some(key_id)), parts[1])?;
                into_utf8(bytes)?
            }
        };

        parse_fields(&plaintext)
    }
}

/// Associated data bound into sealed payloads.
fn associated_data(version: TokenVersion, key_id: Option<KeyId>) -> Vec<u8> {
    match key_id {
        Some(id) => format!("deskshare:{}:{id}", version.tag()).into_bytes(),
        None => format!("deskshare:{}", version.tag()).into_bytes(),
    }
}

fn into_utf8(bytes: Vec<u8>) -> Result<String, TokenError> {
    String::from_utf8(bytes)
        .map_err(|_| TokenError::MalformedToken("decrypted payload is not UTF-8".into()))
}

/// Splits `host,mode,credential` and validates each field.
fn parse_fields(plaintext: &str) -> Result<EndpointDescriptor, TokenError> {
    let fields: Vec<&str> = plaintext.split(FIELD_SEPARATOR).collect();
    if fields.len() != DESCRIPTOR_ARITY {
        return Err(TokenError::MalformedToken(format!(
            "expected {DESCRIPTOR_ARITY} fields, found {}",
            fields.len()
        )));
    }
    Ok(EndpointDescriptor::from_fields(fields[0], fields[1], fields[2])?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
