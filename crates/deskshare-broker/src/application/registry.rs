//! SessionRegistry: the single shared map of bridge sessions.
//!
//! The registry maps each [`TargetEndpoint`] to at most one [`SessionEntry`]
//! and owns public-port allocation.  All of its state sits behind one
//! `std::sync::Mutex` that is only held for short, synchronous sections and
//! never across an `.await`.
//!
//! # Check-then-insert
//!
//! [`SessionRegistry::claim`] looks up the endpoint and, if there is no live
//! session, reserves a port and inserts a `Starting` entry, all under the same
//! lock.  Exactly one caller gets [`Claim::Launch`]; everyone else gets
//! [`Claim::Existing`] and waits on the entry's state channel.
//!
//! # Draining ports
//!
//! When a session is stopped its entry leaves the map immediately, but its
//! public port stays reserved (see [`DrainGuard`]) until the relay has been
//! terminated, so a new relay is never pointed at a port the old one still
//! holds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use super::broker::BrokerError;
use crate::domain::config::PortPool;
use crate::domain::session::{BridgeSession, SessionId, SessionState, TargetEndpoint};
use crate::infrastructure::relay::RelayHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Session entry ─────────────────────────────────────────────────────────────

/// One registry entry: a session's identity, state, and relay handle.
///
/// State changes are published on a `watch` channel so callers that find the
/// entry `Starting` can wait for the outcome.
pub struct SessionEntry {
    id: SessionId,
    endpoint: TargetEndpoint,
    public_port: u16,
    state: watch::Sender<SessionState>,
    handle: Mutex<Option<Box<dyn RelayHandle>>>,
    pid: OnceLock<u32>,
    failure: OnceLock<BrokerError>,
}

impl SessionEntry {
    fn new(endpoint: TargetEndpoint, public_port: u16) -> Self {
        let (state, _) = watch::channel(SessionState::Starting);
        Self {
            id: Uuid::new_v4(),
            endpoint,
            public_port,
            state,
            handle: Mutex::new(None),
            pid: OnceLock::new(),
            failure: OnceLock::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn endpoint(&self) -> &TargetEndpoint {
        &self.endpoint
    }

    pub fn public_port(&self) -> u16 {
        self.public_port
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    /// The launch error, once the entry is `Failed`.
    pub fn failure(&self) -> Option<BrokerError> {
        self.failure.get().cloned()
    }

    pub fn snapshot(&self) -> BridgeSession {
        BridgeSession {
            id: self.id,
            target_endpoint: self.endpoint.clone(),
            public_port: self.public_port,
            state: self.state(),
            pid: self.pid(),
        }
    }

    /// Waits until the entry leaves `Starting` and returns the new state.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|state| state.is_settled()).await {
            Ok(state) => *state,
            // The sender lives in `self`, so this cannot happen while we hold it.
            Err(_) => SessionState::Stopped,
        };
        state
    }

    /// `Starting → Running`: stores the relay handle.
    pub(crate) fn mark_running(&self, handle: Box<dyn RelayHandle>) {
        if let Some(pid) = handle.pid() {
            let _ = self.pid.set(pid);
        }
        *lock(&self.handle) = Some(handle);
        self.state.send_replace(SessionState::Running);
    }

    /// `Starting → Failed`: records the error every waiter will receive.
    pub(crate) fn mark_failed(&self, error: BrokerError) {
        let _ = self.failure.set(error);
        self.state.send_replace(SessionState::Failed);
    }

    /// `Running → Stopped`: hands the relay handle to the caller for termination.
    ///
    /// A `Failed` entry stays `Failed` and has no handle, so this returns `None`.
    pub(crate) fn mark_stopped(&self) -> Option<Box<dyn RelayHandle>> {
        let stopped = self.state.send_if_modified(|state| {
            if *state == SessionState::Running {
                *state = SessionState::Stopped;
                true
            } else {
                false
            }
        });
        if !stopped {
            return None;
        }
        lock(&self.handle).take()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Errors from the registry itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Every port in the pool is held by a live or draining session.
    #[error("no free public port in pool {0}")]
    PoolExhausted(PortPool),
}

/// Outcome of [`SessionRegistry::claim`].
pub enum Claim {
    /// A new `Starting` entry was inserted; the caller must launch its relay.
    Launch(Arc<SessionEntry>),
    /// A `Starting` or `Running` entry already exists for the endpoint.
    Existing(Arc<SessionEntry>),
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<TargetEndpoint, Arc<SessionEntry>>,
    draining: HashSet<u16>,
}

impl Inner {
    fn free_port(&self, pool: PortPool) -> Option<u16> {
        let in_use: HashSet<u16> = self
            .sessions
            .values()
            .filter(|entry| entry.state().holds_port())
            .map(|entry| entry.public_port())
            .chain(self.draining.iter().copied())
            .collect();
        pool.ports().find(|port| !in_use.contains(port))
    }
}

/// The map of bridge sessions keyed by target endpoint.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct SessionRegistry {
    pool: PortPool,
    inner: Arc<Mutex<Inner>>,
}

impl SessionRegistry {
    pub fn new(pool: PortPool) -> Self {
        Self {
            pool,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Finds the live session for `endpoint` or inserts a new `Starting` one.
    ///
    /// A `Failed` entry for the endpoint is evicted and replaced.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PoolExhausted`] when a new entry is needed but
    /// no port is free.  No entry is created in that case.
    pub fn claim(&self, endpoint: &TargetEndpoint) -> Result<Claim, RegistryError> {
        let mut inner = lock(&self.inner);

        if let Some(entry) = inner.sessions.get(endpoint).map(Arc::clone) {
            if entry.state() != SessionState::Failed {
                return Ok(Claim::Existing(entry));
            }
            debug!(session = %entry.id(), target = %endpoint, "evicting failed session");
            inner.sessions.remove(endpoint);
        }

        let port = inner
            .free_port(self.pool)
            .ok_or(RegistryError::PoolExhausted(self.pool))?;
        let entry = Arc::new(SessionEntry::new(endpoint.clone(), port));
        inner.sessions.insert(endpoint.clone(), Arc::clone(&entry));
        Ok(Claim::Launch(entry))
    }

    pub fn get(&self, endpoint: &TargetEndpoint) -> Option<Arc<SessionEntry>> {
        lock(&self.inner).sessions.get(endpoint).map(Arc::clone)
    }

    /// Removes `entry` if it is still the registered session for its endpoint.
    ///
    /// A running entry's port stays reserved until the returned guard is
    /// dropped.  Returns `None` if the entry was already removed or replaced.
    pub fn begin_stop(&self, entry: &Arc<SessionEntry>) -> Option<DrainGuard> {
        let mut inner = lock(&self.inner);
        match inner.sessions.get(entry.endpoint()) {
            Some(current) if Arc::ptr_eq(current, entry) => {}
            _ => return None,
        }
        inner.sessions.remove(entry.endpoint());

        let reserved = entry.state().holds_port().then_some(entry.public_port());
        if let Some(port) = reserved {
            inner.draining.insert(port);
        }
        Some(DrainGuard {
            registry: self.clone(),
            port: reserved,
        })
    }

    /// Snapshots of every entry, ordered by public port.
    pub fn snapshot(&self) -> Vec<BridgeSession> {
        let mut sessions: Vec<BridgeSession> = lock(&self.inner)
            .sessions
            .values()
            .map(|entry| entry.snapshot())
            .collect();
        sessions.sort_by_key(|s| s.public_port);
        sessions
    }

    pub fn endpoints(&self) -> Vec<TargetEndpoint> {
        lock(&self.inner).sessions.keys().cloned().collect()
    }

    /// Ports whose relays are still being terminated.
    pub fn draining_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = lock(&self.inner).draining.iter().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a stopped session's port reserved until dropped.
///
/// Dropping releases the port even if the stop future is cancelled halfway.
#[must_use = "the port is released as soon as the guard is dropped"]
pub struct DrainGuard {
    registry: SessionRegistry,
    port: Option<u16>,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if let Some(port) = self.port {
            lock(&self.registry.inner).draining.remove(&port);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::relay::mock::MockRelayLauncher;
    use crate::infrastructure::relay::{RelayLauncher, RelaySpec};
    use std::path::PathBuf;

    fn endpoint(host: &str) -> TargetEndpoint {
        TargetEndpoint::new(host, 5900)
    }

    fn launched(claim: Claim) -> Arc<SessionEntry> {
        match claim {
            Claim::Launch(entry) => entry,
            Claim::Existing(_) => panic!("expected a new entry"),
        }
    }

    fn mock_handle(port: u16) -> Box<dyn RelayHandle> {
        MockRelayLauncher::new()
            .launch(&RelaySpec {
                binary: "websockify".to_string(),
                cert_path: PathBuf::from("cert.pem"),
                key_path: PathBuf::from("key.pem"),
                public_port: port,
                target: endpoint("10.0.0.5"),
            })
            .unwrap()
    }

    #[test]
    fn test_first_claim_inserts_starting_entry() {
        // Arrange
        let registry = SessionRegistry::new(PortPool::Fixed(8085));

        // Act
        let entry = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());

        // Assert
        assert_eq!(entry.state(), SessionState::Starting);
        assert_eq!(entry.public_port(), 8085);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_second_claim_returns_existing_entry() {
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let first = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());

        let second = registry.claim(&endpoint("10.0.0.5")).unwrap();

        assert!(matches!(second, Claim::Existing(e) if Arc::ptr_eq(&e, &first)));
    }

    #[test]
    fn test_claims_for_distinct_endpoints_get_distinct_ports() {
        let registry = SessionRegistry::new(PortPool::range(8085, 8086).unwrap());

        let a = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());
        let b = launched(registry.claim(&endpoint("10.0.0.6")).unwrap());

        assert_ne!(a.public_port(), b.public_port());
    }

    #[test]
    fn test_exhausted_pool_creates_no_entry() {
        // Arrange: the only port is taken
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let _first = registry.claim(&endpoint("10.0.0.5")).unwrap();

        // Act
        let result = registry.claim(&endpoint("10.0.0.6"));

        // Assert
        assert!(matches!(result, Err(RegistryError::PoolExhausted(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_entry_is_evicted_by_next_claim() {
        // Arrange
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let failed = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());
        failed.mark_failed(BrokerError::BridgeLaunchFailed {
            endpoint: endpoint("10.0.0.5"),
            reason: "boom".to_string(),
        });

        // Act
        let fresh = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());

        // Assert
        assert!(!Arc::ptr_eq(&failed, &fresh));
        assert_ne!(failed.id(), fresh.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_entry_does_not_hold_its_port() {
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let failed = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());
        failed.mark_failed(BrokerError::SessionNotFound(endpoint("10.0.0.5")));

        let other = launched(registry.claim(&endpoint("10.0.0.6")).unwrap());

        assert_eq!(other.public_port(), 8085);
    }

    #[test]
    fn test_draining_port_is_not_reallocated_until_guard_drops() {
        // Arrange: a running session on the only port
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let entry = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());
        entry.mark_running(mock_handle(8085));

        // Act
        let guard = registry.begin_stop(&entry).expect("entry is registered");

        // Assert: entry gone, port still reserved
        assert!(registry.is_empty());
        assert_eq!(registry.draining_ports(), vec![8085]);
        assert!(registry.claim(&endpoint("10.0.0.6")).is_err());

        drop(guard);
        assert!(registry.draining_ports().is_empty());
        assert!(registry.claim(&endpoint("10.0.0.6")).is_ok());
    }

    #[test]
    fn test_begin_stop_ignores_replaced_entry() {
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let stale = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());
        stale.mark_failed(BrokerError::SessionNotFound(endpoint("10.0.0.5")));
        let _fresh = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());

        assert!(registry.begin_stop(&stale).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mark_running_records_pid_and_stop_returns_handle() {
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let entry = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());

        entry.mark_running(mock_handle(8085));
        assert_eq!(entry.state(), SessionState::Running);
        assert!(entry.pid().is_some());

        assert!(entry.mark_stopped().is_some());
        assert_eq!(entry.state(), SessionState::Stopped);
        assert!(entry.mark_stopped().is_none());
    }

    #[test]
    fn test_mark_stopped_leaves_failed_entry_failed() {
        // Arrange
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let entry = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());
        entry.mark_failed(BrokerError::SessionNotFound(endpoint("10.0.0.5")));

        // Act
        let handle = entry.mark_stopped();

        // Assert
        assert!(handle.is_none());
        assert_eq!(entry.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_settled_wakes_when_entry_leaves_starting() {
        // Arrange
        let registry = SessionRegistry::new(PortPool::Fixed(8085));
        let entry = launched(registry.claim(&endpoint("10.0.0.5")).unwrap());
        let waiter = {
            let entry = Arc::clone(&entry);
            tokio::spawn(async move { entry.settled().await })
        };

        // Act
        tokio::task::yield_now().await;
        entry.mark_running(mock_handle(8085));

        // Assert
        assert_eq!(waiter.await.unwrap(), SessionState::Running);
    }

    #[test]
    fn test_snapshot_is_ordered_by_port() {
        let registry = SessionRegistry::new(PortPool::range(8085, 8087).unwrap());
        for host in ["10.0.0.7", "10.0.0.5", "10.0.0.6"] {
            registry.claim(&endpoint(host)).unwrap();
        }

        let ports: Vec<u16> = registry.snapshot().iter().map(|s| s.public_port).collect();

        assert_eq!(ports, vec![8085, 8086, 8087]);
    }
}
