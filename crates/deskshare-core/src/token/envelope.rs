//! The version envelope shared by every token scheme: `"<version>:<payload>"`.

use std::fmt;
use std::str::FromStr;

use super::codec::TokenError;

/// Separator between the version tag and the payload, and between payload parts.
pub const VERSION_SEPARATOR: char = ':';

/// Identifies the encoding scheme that produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenVersion {
    /// Keyless character substitution over `host,mode,credential`.
    Substitution = 1,
    /// Authenticated encryption; the single-use key is appended to the token.
    SealedEphemeral = 2,
    /// Authenticated encryption under a process-held keyring; the key id is in the token.
    SealedKeyring = 3,
}

impl TokenVersion {
    /// The numeric tag written in front of the payload.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Maps a numeric tag back to a version, or `None` if it is not recognised.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(TokenVersion::Substitution),
            2 => Some(TokenVersion::SealedEphemeral),
            3 => Some(TokenVersion::SealedKeyring),
            _ => None,
        }
    }

    /// Number of `:`-separated parts the payload of this version must have.
    pub fn payload_arity(self) -> usize {
        match self {
            TokenVersion::Substitution => 1,
            TokenVersion::SealedEphemeral | TokenVersion::SealedKeyring => 2,
        }
    }
}

/// A parsed token: version tag plus scheme-specific payload text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    version: TokenVersion,
    payload: String,
}

impl Token {
    /// Wraps an already-encoded payload.
    pub fn new(version: TokenVersion, payload: impl Into<String>) -> Self {
        Self {
            version,
            payload: payload.into(),
        }
    }

    /// Splits a token string into its version and payload.
    ///
    /// Leading and trailing whitespace (e.g. a newline from copy/paste) is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::MalformedToken`] when the version prefix is
    /// missing, is not a decimal number, or names an unrecognised version, and
    /// when the payload is empty.
    pub fn parse(text: &str) -> Result<Self, TokenError> {
        let text = text.trim();
        let (tag, payload) = text
            .split_once(VERSION_SEPARATOR)
            .ok_or_else(|| TokenError::MalformedToken("missing version tag".into()))?;

        if tag.is_empty() || !tag.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::MalformedToken(
                "version tag is not a decimal number".into(),
            ));
        }
        let version = tag
            .parse::<u8>()
            .ok()
            .and_then(TokenVersion::from_tag)
            .ok_or_else(|| TokenError::MalformedToken(format!("unrecognized token version {tag}")))?;

        if payload.is_empty() {
            return Err(TokenError::MalformedToken("empty payload".into()));
        }

        Ok(Self::new(version, payload))
    }

    pub fn version(&self) -> TokenVersion {
        self.version
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Splits the payload into exactly [`TokenVersion::payload_arity`] parts.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::MalformedToken`] on any other part count.
    pub fn payload_parts(&self) -> Result<Vec<&str>, TokenError> {
        let expected = self.version.payload_arity();
        let parts: Vec<&str> = if expected == 1 {
            vec![self.payload.as_str()]
        } else {
            self.payload.split(VERSION_SEPARATOR).collect()
        };
        if parts.len() != expected || parts.iter().any(|p| p.is_empty()) {
            return Err(TokenError::MalformedToken(format!(
                "version {} payload must have {expected} part(s), found {}",
                self.version.tag(),
                parts.len()
            )));
        }
        Ok(parts)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.version.tag(), VERSION_SEPARATOR, self.payload)
    }
}

impl FromStr for Token {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::parse(s)
    }
}
