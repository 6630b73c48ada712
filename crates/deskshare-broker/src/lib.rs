//! deskshare-broker library crate.
//!
//! Turns share tokens into running relay processes and browser-joinable URLs.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! token ──► TokenCodec (deskshare-core) ──► EndpointDescriptor
//!                                               │
//! [deskshare-broker]                            ▼
//!   ├── domain/           BrokerConfig, PortPool, TargetEndpoint, ClientUrl
//!   ├── application/      SessionRegistry + SessionBroker (start / stop / redeem)
//!   └── infrastructure/
//!         ├── relay/      RelayLauncher / RelayHandle, child-process implementation
//!         ├── storage/    TOML config file, keyring file
//!         └── local_ip    primary outbound IPv4 address
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain`, `deskshare-core`, and the relay traits.
//!   It never spawns processes itself; a [`RelayLauncher`] is injected.
//! - `infrastructure` holds everything that touches the OS.
//!
//! # For beginners: why inject the launcher?
//!
//! The broker's interesting behaviour is its bookkeeping: one relay per target,
//! same answer for concurrent callers, ports released only after the old relay
//! is gone.  Injecting the launcher lets tests drive all of that with
//! [`MockRelayLauncher`] instead of real child processes.
//!
//! [`RelayLauncher`]: infrastructure::relay::RelayLauncher
//! [`MockRelayLauncher`]: infrastructure::relay::mock::MockRelayLauncher

/// Domain layer: configuration, session and URL types (no I/O).
pub mod domain;

/// Application layer: session registry and broker use cases.
pub mod application;

/// Infrastructure layer: relay processes, file storage, address detection.
pub mod infrastructure;

pub use application::broker::{BrokerError, SessionBroker};
pub use domain::config::{BrokerConfig, PortPool};
pub use domain::session::{BridgeSession, SessionState, TargetEndpoint};
pub use domain::url::ClientUrl;
