//! Broker configuration types.
//!
//! [`BrokerConfig`] is the single source of truth for runtime settings.  It is
//! read from a TOML file by [`load_config`] and then selectively overridden by
//! CLI flags.  Every field has a default so the broker works with no file at
//! all:
//!
//! ```toml
//! [relay]
//! binary = "websockify"
//! cert_path = "cert.pem"
//! key_path = "key.pem"
//! target_port = 5900
//! ports = "8085"
//! stop_grace_ms = 3000
//! exit_check_ms = 0
//!
//! [viewer]
//! scheme = "http"
//! web_port = 3000
//! path = "/viewer"
//! embed_credential = true
//!
//! [token]
//! default_scheme = "sealed-ephemeral"
//! substitution_shift = 3
//! ```
//!
//! [`load_config`]: crate::infrastructure::storage::config::load_config

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use deskshare_core::Scheme;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

/// How relay processes are launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Relay executable, looked up on `PATH` when not absolute.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// TLS certificate handed to the relay.
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    /// TLS private key handed to the relay.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
    /// Port of the framebuffer service on the target host.
    #[serde(default = "default_target_port")]
    pub target_port: u16,
    /// Browser-facing ports the broker may bind relays to.
    #[serde(default)]
    pub ports: PortPool,
    /// How long a relay gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// How long a launch watches the new relay for an early exit.  0 checks once.
    #[serde(default)]
    pub exit_check_ms: u64,
}

/// How the viewer URL is composed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    /// `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Host browsers use to reach this machine.  Detected at startup when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_host: Option<String>,
    /// Port of the web server hosting the viewer page.
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    /// Path of the viewer page.
    #[serde(default = "default_path")]
    pub path: String,
    /// Whether a descriptor's credential is passed to the viewer in the URL.
    #[serde(default = "default_true")]
    pub embed_credential: bool,
}

/// Token defaults for the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenConfig {
    /// Scheme used by `encode` and `share` when none is given.
    #[serde(default = "default_token_scheme")]
    pub default_scheme: Scheme,
    /// Offset of the legacy substitution scheme.
    #[serde(default = "default_substitution_shift")]
    pub substitution_shift: i32,
    /// Keyring file for version 3 tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_binary() -> String {
    "websockify".to_string()
}
fn default_cert_path() -> PathBuf {
    PathBuf::from("cert.pem")
}
fn default_key_path() -> PathBuf {
    PathBuf::from("key.pem")
}
fn default_target_port() -> u16 {
    5900
}
fn default_stop_grace_ms() -> u64 {
    3000
}
fn default_scheme() -> String {
    "http".to_string()
}
fn default_web_port() -> u16 {
    3000
}
fn default_path() -> String {
    "/viewer".to_string()
}
fn default_true() -> bool {
    true
}
fn default_token_scheme() -> Scheme {
    Scheme::SealedEphemeral
}
fn default_substitution_shift() -> i32 {
    3
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
            target_port: default_target_port(),
            ports: PortPool::default(),
            stop_grace_ms: default_stop_grace_ms(),
            exit_check_ms: 0,
        }
    }
}

impl RelayConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn exit_check(&self) -> Duration {
        Duration::from_millis(self.exit_check_ms)
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            public_host: None,
            web_port: default_web_port(),
            path: default_path(),
            embed_credential: default_true(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            default_scheme: default_token_scheme(),
            substitution_shift: default_substitution_shift(),
            key_file: None,
        }
    }
}

// ── Port pool ─────────────────────────────────────────────────────────────────

/// Port used by earlier single-relay deployments.
pub const DEFAULT_PUBLIC_PORT: u16 = 8085;

/// Error parsing a [`PortPool`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid port pool {0:?}: expected \"<port>\" or \"<first>-<last>\" with 0 < first <= last")]
pub struct PortPoolError(pub String);

/// The set of browser-facing ports relays may bind to.
///
/// Written in config files as `"8085"` (a single fixed port, so at most one
/// relay at a time) or `"8085-8095"` (an inclusive range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PortPool {
    Fixed(u16),
    Range { first: u16, last: u16 },
}

impl Default for PortPool {
    fn default() -> Self {
        PortPool::Fixed(DEFAULT_PUBLIC_PORT)
    }
}

impl PortPool {
    /// Creates an inclusive range pool.
    ///
    /// # Errors
    ///
    /// Returns [`PortPoolError`] if `first` is 0 or greater than `last`.
    pub fn range(first: u16, last: u16) -> Result<Self, PortPoolError> {
        if first == 0 || first > last {
            return Err(PortPoolError(format!("{first}-{last}")));
        }
        Ok(PortPool::Range { first, last })
    }

    /// All ports in the pool, in ascending order.
    pub fn ports(&self) -> impl Iterator<Item = u16> {
        let (first, last) = match *self {
            PortPool::Fixed(port) => (port, port),
            PortPool::Range { first, last } => (first, last),
        };
        first..=last
    }

}

impl fmt::Display for PortPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortPool::Fixed(port) => write!(f, "{port}"),
            PortPool::Range { first, last } => write!(f, "{first}-{last}"),
        }
    }
}

impl FromStr for PortPool {
    type Err = PortPoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PortPoolError(s.to_string());
        let parse = |text: &str| text.trim().parse::<u16>().map_err(|_| invalid());

        match s.split_once('-') {
            Some((first, last)) => PortPool::range(parse(first)?, parse(last)?).map_err(|_| invalid()),
            None => match parse(s)? {
                0 => Err(invalid()),
                port => Ok(PortPool::Fixed(port)),
            },
        }
    }
}

impl TryFrom<String> for PortPool {
    type Error = PortPoolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortPool> for String {
    fn from(pool: PortPool) -> Self {
        pool.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
