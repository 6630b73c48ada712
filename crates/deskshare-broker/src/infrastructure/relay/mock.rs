//! Mock relay launcher for testing.
//!
//! Records every launch and termination without spawning processes, and can
//! be switched into a failing mode to exercise the broker's error paths.
//! Clones share their state, so a test keeps one clone for assertions and
//! hands the other to the broker.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{LaunchError, RelayHandle, RelayLauncher, RelaySpec, Termination};

#[derive(Default)]
struct Recorded {
    launches: Vec<RelaySpec>,
    terminations: Vec<u16>,
    failure: Option<LaunchError>,
    launch_delay: Option<Duration>,
}

/// A recording implementation of [`RelayLauncher`].
#[derive(Clone, Default)]
pub struct MockRelayLauncher {
    state: Arc<Mutex<Recorded>>,
    next_pid: Arc<AtomicU32>,
}

impl MockRelayLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following launch fail with `error`.
    pub fn fail_with(&self, error: LaunchError) {
        self.lock().failure = Some(error);
    }

    /// Makes following launches succeed again.
    pub fn succeed(&self) {
        self.lock().failure = None;
    }

    /// Blocks each launch for `delay`, widening the window in which other
    /// callers observe a `Starting` session.
    pub fn set_launch_delay(&self, delay: Duration) {
        self.lock().launch_delay = Some(delay);
    }

    /// Number of launch attempts, failed ones included.
    pub fn launch_count(&self) -> usize {
        self.lock().launches.len()
    }

    /// Specs of every launch attempt, in order.
    pub fn launches(&self) -> Vec<RelaySpec> {
        self.lock().launches.clone()
    }

    /// Number of handles terminated through [`RelayHandle::terminate`].
    pub fn termination_count(&self) -> usize {
        self.lock().terminations.len()
    }

    /// Public ports of terminated relays, in order.
    pub fn terminated_ports(&self) -> Vec<u16> {
        self.lock().terminations.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RelayLauncher for MockRelayLauncher {
    fn launch(&self, spec: &RelaySpec) -> Result<Box<dyn RelayHandle>, LaunchError> {
        let (failure, delay) = {
            let mut state = self.lock();
            state.launches.push(spec.clone());
            (state.failure.clone(), state.launch_delay)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if let Some(error) = failure {
            return Err(error);
        }

        let pid = 10_000 + self.next_pid.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockRelayHandle {
            pid,
            public_port: spec.public_port,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Handle returned by [`MockRelayLauncher`].
pub struct MockRelayHandle {
    pid: u32,
    public_port: u16,
    state: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl RelayHandle for MockRelayHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn terminate(&mut self, _grace: Duration) -> io::Result<Termination> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .terminations
            .push(self.public_port);
        Ok(Termination::Graceful)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::TargetEndpoint;
    use std::path::PathBuf;

    fn spec(port: u16) -> RelaySpec {
        RelaySpec {
            binary: "websockify".to_string(),
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            public_port: port,
            target: TargetEndpoint::new("10.0.0.5", 5900),
        }
    }

    #[test]
    fn test_mock_records_launches() {
        // Arrange
        let launcher = MockRelayLauncher::new();

        // Act
        let first = launcher.launch(&spec(8085)).unwrap();
        let second = launcher.launch(&spec(8086)).unwrap();

        // Assert
        assert_eq!(launcher.launch_count(), 2);
        assert_eq!(launcher.launches()[1].public_port, 8086);
        assert_ne!(first.pid(), second.pid());
    }

    #[test]
    fn test_mock_failure_switch() {
        let launcher = MockRelayLauncher::new();
        launcher.fail_with(LaunchError::BinaryNotFound("websockify".to_string()));

        assert!(launcher.launch(&spec(8085)).is_err());

        launcher.succeed();
        assert!(launcher.launch(&spec(8085)).is_ok());
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_records_terminations_across_clones() {
        // Arrange
        let launcher = MockRelayLauncher::new();
        let observer = launcher.clone();
        let mut handle = launcher.launch(&spec(8085)).unwrap();

        // Act
        let outcome = handle.terminate(Duration::from_secs(1)).await.unwrap();

        // Assert
        assert_eq!(outcome, Termination::Graceful);
        assert_eq!(observer.termination_count(), 1);
        assert_eq!(observer.terminated_ports(), vec![8085]);
    }
}
