//! The endpoint descriptor: *what* is being shared and *how*.
//!
//! An [`EndpointDescriptor`] is the tuple a share token carries:
//!
//! ```text
//! { target_host: "192.168.1.17", access_mode: FullControl, credential: Some("aB3dE9xQ") }
//! ```
//!
//! Every constructor validates its input, so a descriptor that exists is always
//! fully populated: the host passes the syntax check, the access mode is one of
//! the two defined values, and a credential (if present) can never be confused
//! with the [`FIELD_SEPARATOR`] used by the token serialization.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Separator between the fields of a serialized descriptor (`host,mode,credential`).
pub const FIELD_SEPARATOR: char = ',';

/// Maximum length of a DNS hostname (RFC 1123).
const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single hostname label.
const MAX_LABEL_LEN: usize = 63;

/// Errors describing a descriptor that is not fully and validly populated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// The target host is empty.
    #[error("target host is empty")]
    EmptyHost,

    /// The target host is neither a dotted quad nor a valid hostname.
    #[error("invalid target host: {0:?}")]
    InvalidHost(String),

    /// The access mode is not one of the two defined values.
    #[error("unknown access mode: {0:?}")]
    UnknownAccessMode(String),

    /// A credential was supplied but it is the empty string.
    #[error("credential is empty")]
    EmptyCredential,

    /// The credential contains the field separator, whitespace, or a control character.
    #[error("credential contains a forbidden character")]
    InvalidCredential,
}

// ── Access mode ───────────────────────────────────────────────────────────────

/// Whether the viewer may send input to the shared desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// The viewer sees the framebuffer but cannot send keyboard or mouse input.
    ViewOnly,
    /// The viewer has full keyboard and mouse control.
    FullControl,
}

impl AccessMode {
    /// Single-character code used inside serialized tokens.
    ///
    /// `'0'` is view-only and `'1'` is full control, matching the codes earlier
    /// deployments put on the wire.
    pub fn wire_code(self) -> char {
        match self {
            AccessMode::ViewOnly => '0',
            AccessMode::FullControl => '1',
        }
    }

    /// Parses the wire code produced by [`AccessMode::wire_code`].
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::UnknownAccessMode`] for anything other than
    /// `"0"` or `"1"`.
    pub fn from_wire_code(code: &str) -> Result<Self, DescriptorError> {
        match code {
            "0" => Ok(AccessMode::ViewOnly),
            "1" => Ok(AccessMode::FullControl),
            other => Err(DescriptorError::UnknownAccessMode(other.to_string())),
        }
    }

    /// Returns `true` when the viewer must not be able to send input.
    pub fn is_view_only(self) -> bool {
        matches!(self, AccessMode::ViewOnly)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ViewOnly => f.write_str("view-only"),
            AccessMode::FullControl => f.write_str("full-control"),
        }
    }
}

impl FromStr for AccessMode {
    type Err = DescriptorError;

    /// Accepts human-readable names (`view`, `full`, ...) as well as wire codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" | "view-only" | "view_only" | "viewonly" | "0" => Ok(AccessMode::ViewOnly),
            "full" | "full-control" | "full_control" | "fullcontrol" | "control" | "1" => {
                Ok(AccessMode::FullControl)
            }
            _ => Err(DescriptorError::UnknownAccessMode(s.to_string())),
        }
    }
}

// ── Endpoint descriptor ───────────────────────────────────────────────────────

/// The logical tuple identifying what to share and how.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EndpointDescriptor {
    target_host: String,
    access_mode: AccessMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    credential: Option<String>,
}

impl EndpointDescriptor {
    /// Creates a descriptor without a credential.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::EmptyHost`] or [`DescriptorError::InvalidHost`]
    /// when `target_host` fails the host-syntax check.
    ///
    /// # Example
    ///
    /// ```rust
    /// use deskshare_core::{AccessMode, EndpointDescriptor};
    ///
    /// let d = EndpointDescriptor::new("10.0.0.5", AccessMode::ViewOnly).unwrap();
    /// assert_eq!(d.target_host(), "10.0.0.5");
    /// assert!(d.credential().is_none());
    /// ```
    pub fn new(target_host: impl Into<String>, access_mode: AccessMode) -> Result<Self, DescriptorError> {
        let target_host = target_host.into();
        validate_host(&target_host)?;
        Ok(Self {
            target_host,
            access_mode,
            credential: None,
        })
    }

    /// Attaches a credential to the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::EmptyCredential`] for `""` and
    /// [`DescriptorError::InvalidCredential`] when the credential contains the
    /// field separator, whitespace, or a control character.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Result<Self, DescriptorError> {
        let credential = credential.into();
        validate_credential(&credential)?;
        self.credential = Some(credential);
        Ok(self)
    }

    /// Rebuilds a descriptor from the three serialized fields of a token.
    ///
    /// An empty credential field means "no credential".
    pub(crate) fn from_fields(host: &str, mode_code: &str, credential: &str) -> Result<Self, DescriptorError> {
        let mode = AccessMode::from_wire_code(mode_code)?;
        let descriptor = Self::new(host, mode)?;
        if credential.is_empty() {
            Ok(descriptor)
        } else {
            descriptor.with_credential(credential)
        }
    }

    /// Serializes the descriptor as `host,mode,credential`.
    ///
    /// The credential field is empty when there is no credential, so the output
    /// always has exactly three fields.
    pub(crate) fn to_fields(&self) -> String {
        format!(
            "{host}{sep}{mode}{sep}{cred}",
            host = self.target_host,
            mode = self.access_mode.wire_code(),
            cred = self.credential.as_deref().unwrap_or(""),
            sep = FIELD_SEPARATOR,
        )
    }

    /// Re-checks every field invariant.
    ///
    /// # Errors
    ///
    /// Returns the first [`DescriptorError`] found.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        validate_host(&self.target_host)?;
        if let Some(credential) = &self.credential {
            validate_credential(credential)?;
        }
        Ok(())
    }

    /// The host running the remote framebuffer service.
    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    /// The access level granted to whoever redeems the token.
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// The relay password, for schemes that embed one.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Checks that `host` is a dotted-quad IPv4 address or an RFC 1123 hostname.
///
/// IPv6 literals are rejected: the `host:port` relay argument and the viewer
/// URL would both need bracket quoting.
///
/// # Errors
///
/// Returns [`DescriptorError::EmptyHost`] for `""` and
/// [`DescriptorError::InvalidHost`] for anything else that does not pass.
pub fn validate_host(host: &str) -> Result<(), DescriptorError> {
    if host.is_empty() {
        return Err(DescriptorError::EmptyHost);
    }
    if host.parse::<Ipv4Addr>().is_ok() {
        return Ok(());
    }

    let invalid = || DescriptorError::InvalidHost(host.to_string());

    if host.len() > MAX_HOSTNAME_LEN {
        return Err(invalid());
    }
    // A name made only of digits and dots that did not parse as IPv4 above is
    // a malformed address, not a hostname.
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }
    for label in host.split('.') {
        let well_formed = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !well_formed {
            return Err(invalid());
        }
    }
    Ok(())
}

fn validate_credential(credential: &str) -> Result<(), DescriptorError> {
    if credential.is_empty() {
        return Err(DescriptorError::EmptyCredential);
    }
    if credential
        .chars()
        .any(|c| c == FIELD_SEPARATOR || c.is_whitespace() || c.is_control())
    {
        return Err(DescriptorError::InvalidCredential);
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
