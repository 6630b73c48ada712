//! Bridge sessions: one relay process bridging a public port to a target.
//!
//! # Session lifecycle (for beginners)
//!
//! ```text
//!              launch ok
//! Starting ────────────────► Running ──── stop ───► Stopped (removed)
//!     │
//!     │ launch failed
//!     ▼
//!  Failed  (kept visible; evicted by the next start for the same target)
//! ```
//!
//! - `Starting`: a port is reserved and the relay is being spawned.
//! - `Running`: the relay process spawned without an immediate error.  It may
//!   not accept connections yet.
//! - `Failed`: the spawn failed; the error is kept for callers that waited.
//! - `Stopped`: terminal.  The entry leaves the registry at the same time.

use std::fmt;

use deskshare_core::EndpointDescriptor;
use serde::Serialize;
use uuid::Uuid;

/// Identifier used to correlate log lines of one session.
pub type SessionId = Uuid;

/// The framebuffer service a relay forwards to: `host:port`.
///
/// This is the registry key, so two descriptors that differ only in access
/// mode or credential share one relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TargetEndpoint {
    pub host: String,
    pub port: u16,
}

impl TargetEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The endpoint a descriptor points at, given the service port.
    pub fn for_descriptor(descriptor: &EndpointDescriptor, port: u16) -> Self {
        Self::new(descriptor.target_host(), port)
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Running,
    Stopped,
    Failed,
}

impl SessionState {
    /// Whether the session has left `Starting`.
    pub fn is_settled(self) -> bool {
        !matches!(self, SessionState::Starting)
    }

    /// Whether the session holds its public port.
    pub fn holds_port(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        })
    }
}

/// A point-in-time view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeSession {
    pub id: SessionId,
    pub target_endpoint: TargetEndpoint,
    pub public_port: u16,
    pub state: SessionState,
    /// Relay process id, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}
