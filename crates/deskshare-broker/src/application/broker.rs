//! SessionBroker: turns decoded descriptors into running relays and URLs.
//!
//! # Start flow
//!
//! ```text
//! start(descriptor)
//!   │ validate
//!   ▼
//! registry.claim(endpoint) ──► Existing ──► wait until settled ──► Running → URL
//!   │                                                          └─► Failed  → same error
//!   ▼ Launch
//! launcher.launch(spec)     (synchronous, no await while Starting)
//!   ├─ Ok  → Running → URL
//!   └─ Err → Failed  → BridgeLaunchFailed
//! ```
//!
//! The URL is built per request: two callers sharing one relay may still get
//! different URLs when one asked for view-only access and the other did not.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use deskshare_core::{DescriptorError, EndpointDescriptor, TokenCodec, TokenError};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::registry::{Claim, SessionEntry, SessionRegistry};
use crate::domain::config::{BrokerConfig, RelayConfig};
use crate::domain::session::{BridgeSession, SessionState, TargetEndpoint};
use crate::domain::url::{ClientUrl, ClientUrlBuilder, ViewerUrlError};
use crate::infrastructure::relay::{RelayLauncher, RelaySpec, Termination};

/// Interval between readiness checks in [`SessionBroker::wait_ready`].
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors returned by broker operations.
///
/// `Clone` so that every caller waiting on one launch receives the same error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The token could not be decoded.
    #[error(transparent)]
    Token(TokenError),

    /// The descriptor is incomplete or invalid.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(DescriptorError),

    /// The relay could not be started, or no public port was free.
    #[error("failed to start relay for {endpoint}: {reason}")]
    BridgeLaunchFailed {
        endpoint: TargetEndpoint,
        reason: String,
    },

    /// The relay did not accept connections in time.
    #[error("relay for {endpoint} not accepting connections on port {port} after {waited:?}")]
    RelayNotReady {
        endpoint: TargetEndpoint,
        port: u16,
        waited: Duration,
    },

    /// There is no running session for the endpoint.
    #[error("no running session for {0}")]
    SessionNotFound(TargetEndpoint),
}

impl BrokerError {
    /// Whether retrying the same request later may succeed.
    ///
    /// `false` for bad input, which will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrokerError::BridgeLaunchFailed { .. } | BrokerError::RelayNotReady { .. }
        )
    }
}

impl From<TokenError> for BrokerError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidDescriptor(d) => BrokerError::InvalidDescriptor(d),
            other => BrokerError::Token(other),
        }
    }
}

impl From<DescriptorError> for BrokerError {
    fn from(e: DescriptorError) -> Self {
        BrokerError::InvalidDescriptor(e)
    }
}

// ── Broker ────────────────────────────────────────────────────────────────────

/// The bridge session broker.
///
/// Share one instance (behind an `Arc`) between all callers; all mutable state
/// lives in its [`SessionRegistry`].
pub struct SessionBroker {
    relay: RelayConfig,
    urls: ClientUrlBuilder,
    launcher: Arc<dyn RelayLauncher>,
    registry: SessionRegistry,
}

impl SessionBroker {
    /// Creates a broker that advertises relays at `public_host`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewerUrlError`] if the viewer settings and `public_host` do
    /// not form a valid base URL.
    pub fn new(
        config: &BrokerConfig,
        public_host: &str,
        launcher: Arc<dyn RelayLauncher>,
    ) -> Result<Self, ViewerUrlError> {
        Ok(Self {
            relay: config.relay.clone(),
            urls: ClientUrlBuilder::new(&config.viewer, public_host)?,
            launcher,
            registry: SessionRegistry::new(config.relay.ports),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The framebuffer endpoint a descriptor is bridged to.
    pub fn target_for(&self, descriptor: &EndpointDescriptor) -> TargetEndpoint {
        TargetEndpoint::for_descriptor(descriptor, self.relay.target_port)
    }

    /// Starts (or reuses) the relay for `descriptor` and returns its viewer URL.
    ///
    /// The URL is returned once the relay process exists; the relay may need
    /// a moment before it accepts connections (see [`Self::wait_ready`]).
    ///
    /// # Errors
    ///
    /// - [`BrokerError::InvalidDescriptor`] for an invalid descriptor.
    /// - [`BrokerError::BridgeLaunchFailed`] when the relay cannot be started
    ///   or the port pool is exhausted.
    pub async fn start(&self, descriptor: &EndpointDescriptor) -> Result<ClientUrl, BrokerError> {
        descriptor.validate()?;
        let endpoint = self.target_for(descriptor);

        loop {
            let claim = self.registry.claim(&endpoint).map_err(|e| {
                warn!(target = %endpoint, error = %e, "cannot start relay");
                BrokerError::BridgeLaunchFailed {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                }
            })?;

            let entry = match claim {
                Claim::Launch(entry) => {
                    self.launch(&entry)?;
                    entry
                }
                Claim::Existing(entry) => {
                    let state = entry.settled().await;
                    match state {
                        SessionState::Running => {
                            info!(
                                session = %entry.id(),
                                target = %endpoint,
                                public_port = entry.public_port(),
                                "reusing running relay"
                            );
                            entry
                        }
                        SessionState::Failed => {
                            return Err(entry.failure().unwrap_or_else(|| {
                                BrokerError::BridgeLaunchFailed {
                                    endpoint: endpoint.clone(),
                                    reason: "relay failed to start".to_string(),
                                }
                            }));
                        }
                        // Stopped while we waited; look again.
                        SessionState::Stopped | SessionState::Starting => continue,
                    }
                }
            };

            return Ok(self.urls.build(entry.public_port(), descriptor));
        }
    }

    /// Launches the relay for a freshly claimed `Starting` entry.
    ///
    /// Must not await: the entry has to leave `Starting` even if the calling
    /// future is dropped.
    fn launch(&self, entry: &SessionEntry) -> Result<(), BrokerError> {
        let spec = RelaySpec {
            binary: self.relay.binary.clone(),
            cert_path: self.relay.cert_path.clone(),
            key_path: self.relay.key_path.clone(),
            public_port: entry.public_port(),
            target: entry.endpoint().clone(),
        };

        match self.launcher.launch(&spec) {
            Ok(handle) => {
                entry.mark_running(handle);
                info!(
                    session = %entry.id(),
                    target = %entry.endpoint(),
                    public_port = entry.public_port(),
                    pid = ?entry.pid(),
                    "relay started"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    session = %entry.id(),
                    target = %entry.endpoint(),
                    public_port = entry.public_port(),
                    error = %e,
                    "relay launch failed"
                );
                let error = BrokerError::BridgeLaunchFailed {
                    endpoint: entry.endpoint().clone(),
                    reason: e.to_string(),
                };
                entry.mark_failed(error.clone());
                Err(error)
            }
        }
    }

    /// Stops the session for `endpoint` and terminates its relay.
    ///
    /// Returns the removed session, or `None` if there was nothing to stop.
    /// A session that is still `Starting` is waited on first.  A `Failed`
    /// session has no relay; it is removed and keeps its `Failed` state.
    /// Termination problems are logged; the session is removed regardless.
    pub async fn stop(&self, endpoint: &TargetEndpoint) -> Option<BridgeSession> {
        let Some(entry) = self.registry.get(endpoint) else {
            debug!(target = %endpoint, "no session to stop");
            return None;
        };
        entry.settled().await;

        // Someone else stopped or replaced it while we waited.
        let _drain = self.registry.begin_stop(&entry)?;

        if let Some(mut handle) = entry.mark_stopped() {
            match handle.terminate(self.relay.stop_grace()).await {
                Ok(Termination::Forced) => warn!(
                    session = %entry.id(),
                    grace_ms = self.relay.stop_grace_ms,
                    "relay ignored termination signal; killed"
                ),
                Ok(_) => {}
                Err(e) => warn!(session = %entry.id(), error = %e, "failed to terminate relay"),
            }
        }

        info!(
            session = %entry.id(),
            target = %endpoint,
            public_port = entry.public_port(),
            "session stopped"
        );
        Some(entry.snapshot())
    }

    /// Decodes `token` with `codec` and starts the session it describes.
    ///
    /// # Errors
    ///
    /// [`BrokerError::Token`] or [`BrokerError::InvalidDescriptor`] for a bad
    /// token, otherwise as [`Self::start`].
    pub async fn redeem(&self, codec: &TokenCodec, token: &str) -> Result<ClientUrl, BrokerError> {
        let descriptor = codec.decode(token)?;
        self.start(&descriptor).await
    }

    /// Waits until the relay for `endpoint` accepts TCP connections.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::SessionNotFound`] if there is no running session.
    /// - [`BrokerError::RelayNotReady`] if `timeout` elapses first.
    pub async fn wait_ready(
        &self,
        endpoint: &TargetEndpoint,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        let entry = self
            .registry
            .get(endpoint)
            .ok_or_else(|| BrokerError::SessionNotFound(endpoint.clone()))?;
        if entry.settled().await != SessionState::Running {
            return Err(BrokerError::SessionNotFound(endpoint.clone()));
        }

        let port = entry.public_port();
        let accepting = async {
            while TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.is_err() {
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, accepting)
            .await
            .map_err(|_| BrokerError::RelayNotReady {
                endpoint: endpoint.clone(),
                port,
                waited: timeout,
            })?;

        debug!(session = %entry.id(), public_port = port, "relay accepting connections");
        Ok(())
    }

    /// Snapshots of every session, for diagnostics.
    pub fn sessions(&self) -> Vec<BridgeSession> {
        self.registry.snapshot()
    }

    /// Stops every session.  Returns how many were stopped.
    pub async fn shutdown(&self) -> usize {
        let mut stopped = 0;
        for endpoint in self.registry.endpoints() {
            if self.stop(&endpoint).await.is_some() {
                stopped += 1;
            }
        }
        info!(stopped, "broker shut down");
        stopped
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
