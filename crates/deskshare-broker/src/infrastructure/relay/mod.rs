//! Relay process infrastructure.
//!
//! A relay is an external, websockify-compatible program that accepts TLS
//! WebSocket connections from browsers on a public port and forwards them as
//! raw TCP to the framebuffer service on the target host:
//!
//! ```text
//! <binary> --cert=<cert> --key=<key> <public_port> <host>:<target_port>
//! ```
//!
//! # Testability
//!
//! The broker only sees the [`RelayLauncher`] and [`RelayHandle`] traits.
//! Production uses [`process::ProcessRelayLauncher`]; tests use
//! [`mock::MockRelayLauncher`], which records launches without spawning.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::session::TargetEndpoint;

pub mod mock;
pub mod process;

/// Everything needed to start one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySpec {
    pub binary: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub public_port: u16,
    pub target: TargetEndpoint,
}

impl RelaySpec {
    /// Command-line arguments passed to the relay binary.
    pub fn args(&self) -> Vec<String> {
        vec![
            format!("--cert={}", self.cert_path.display()),
            format!("--key={}", self.key_path.display()),
            self.public_port.to_string(),
            self.target.to_string(),
        ]
    }
}

/// Why a relay could not be started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The relay executable does not exist or is not on `PATH`.
    #[error("relay binary {0:?} not found")]
    BinaryNotFound(String),

    /// The relay executable exists but may not be executed.
    #[error("permission denied executing relay binary {0:?}")]
    PermissionDenied(String),

    /// Something outside the broker already listens on the public port.
    #[error("public port {0} is already in use")]
    PortInUse(u16),

    /// The process exited before the launch call returned.
    #[error("relay exited immediately ({0})")]
    ExitedImmediately(String),

    /// Any other spawn failure.
    #[error("failed to spawn relay: {0}")]
    Spawn(String),
}

/// How a relay ended when it was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The relay exited within the grace period after the termination signal.
    Graceful,
    /// The grace period elapsed and the relay was killed.
    Forced,
    /// The relay had already exited.
    AlreadyExited,
}

/// Starts relay processes.
///
/// Launching is synchronous on purpose: the broker calls it while a session
/// is `Starting`, and nothing may suspend between reserving the port and
/// recording the outcome.
pub trait RelayLauncher: Send + Sync {
    /// Spawns a relay for `spec`.
    ///
    /// Returns as soon as the process exists; it does not wait for the relay
    /// to accept connections.
    fn launch(&self, spec: &RelaySpec) -> Result<Box<dyn RelayHandle>, LaunchError>;
}

/// Exclusive handle to one running relay.
///
/// Dropping the handle without calling [`RelayHandle::terminate`] must still
/// end the process.
#[async_trait]
pub trait RelayHandle: Send {
    /// OS process id, if the implementation has one.
    fn pid(&self) -> Option<u32>;

    /// Asks the relay to exit, waits up to `grace`, then kills it.
    async fn terminate(&mut self, grace: Duration) -> io::Result<Termination>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_args_follow_websockify_convention() {
        // Arrange
        let spec = RelaySpec {
            binary: "websockify".to_string(),
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            public_port: 8085,
            target: TargetEndpoint::new("10.0.0.5", 5900),
        };

        // Act
        let args = spec.args();

        // Assert
        assert_eq!(
            args,
            vec!["--cert=cert.pem", "--key=key.pem", "8085", "10.0.0.5:5900"]
        );
    }
}
