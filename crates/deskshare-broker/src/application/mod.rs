//! Application layer use cases for the broker.
//!
//! # What lives here? (for beginners)
//!
//! The application layer turns decoded share descriptors into running relays
//! and viewer URLs.  It decides *when* a relay is started or stopped and keeps
//! the books on which relays exist, but it never spawns a process itself: that
//! is the injected [`RelayLauncher`]'s job.
//!
//! # Sub-modules
//!
//! - **`registry`** – The shared map from target endpoint to session, plus
//!   public-port allocation.  Guarantees at most one live relay per target.
//!
//! - **`broker`** – The use cases: start (idempotent), stop, redeem a token,
//!   wait for a relay to accept connections, list sessions, shut down.
//!
//! [`RelayLauncher`]: crate::infrastructure::relay::RelayLauncher

pub mod broker;
pub mod registry;
