//! Relay launcher backed by real child processes.
//!
//! # Termination
//!
//! [`ProcessRelayHandle::terminate`] sends `SIGTERM` on Unix, waits up to the
//! grace period for the relay to exit, and then kills it.  On other platforms
//! there is no polite signal, so the relay is killed straight away.
//!
//! Children are spawned with `kill_on_drop(true)`, so a handle that is
//! dropped without `terminate` (for example when the broker itself is
//! dropped) still takes its relay down.

use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{LaunchError, RelayHandle, RelayLauncher, RelaySpec, Termination};

/// Spawns the configured relay binary as a child process.
#[derive(Debug, Default, Clone)]
pub struct ProcessRelayLauncher {
    exit_check: Duration,
}

impl ProcessRelayLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watches each new relay for `window` after spawning and reports an
    /// early exit as [`LaunchError::ExitedImmediately`].
    ///
    /// The launch blocks the calling thread for up to `window`.  A zero
    /// window checks the child exactly once.
    pub fn with_exit_check(mut self, window: Duration) -> Self {
        self.exit_check = window;
        self
    }
}

const EXIT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

impl RelayLauncher for ProcessRelayLauncher {
    fn launch(&self, spec: &RelaySpec) -> Result<Box<dyn RelayHandle>, LaunchError> {
        ensure_port_free(spec.public_port)?;

        let mut child = Command::new(&spec.binary)
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| map_spawn_error(&spec.binary, e))?;

        // Catch binaries that fail argument parsing before we return.
        check_still_running(&mut child, self.exit_check)?;

        info!(
            pid = child.id(),
            public_port = spec.public_port,
            target = %spec.target,
            "relay process spawned"
        );
        Ok(Box::new(ProcessRelayHandle { child }))
    }
}

fn check_still_running(child: &mut Child, window: Duration) -> Result<(), LaunchError> {
    let deadline = Instant::now() + window;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Err(LaunchError::ExitedImmediately(status.to_string())),
            Ok(None) => {}
            Err(e) => return Err(LaunchError::Spawn(format!("failed to check relay status: {e}"))),
        }
        if Instant::now() >= deadline {
            return Ok(());
        }
        std::thread::sleep(EXIT_CHECK_INTERVAL);
    }
}

/// Fails fast when something outside the broker already owns `port`.
fn ensure_port_free(port: u16) -> Result<(), LaunchError> {
    match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(LaunchError::PortInUse(port)),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(LaunchError::Spawn(format!(
            "not permitted to bind public port {port}: {e}"
        ))),
        Err(e) => Err(LaunchError::Spawn(format!("cannot bind public port {port}: {e}"))),
    }
}

fn map_spawn_error(binary: &str, e: io::Error) -> LaunchError {
    match e.kind() {
        io::ErrorKind::NotFound => LaunchError::BinaryNotFound(binary.to_string()),
        io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied(binary.to_string()),
        _ => LaunchError::Spawn(e.to_string()),
    }
}

/// Handle to a spawned relay process.
#[derive(Debug)]
pub struct ProcessRelayHandle {
    child: Child,
}

#[async_trait]
impl RelayHandle for ProcessRelayHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self, grace: Duration) -> io::Result<Termination> {
        if let Some(status) = self.child.try_wait()? {
            debug!(%status, "relay had already exited");
            return Ok(Termination::AlreadyExited);
        }

        if send_terminate_signal(&self.child) {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    debug!(%status, "relay exited after SIGTERM");
                    return Ok(Termination::Graceful);
                }
                Err(_) => warn!(?grace, pid = self.child.id(), "relay ignored SIGTERM; killing"),
            }
        }

        self.child.kill().await?;
        Ok(Termination::Forced)
    }
}

/// Sends SIGTERM to the child.  Returns `false` when no signal could be sent.
#[cfg(unix)]
fn send_terminate_signal(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: `kill` has no memory-safety preconditions; `pid` is our own
    // child, which has not been reaped because `try_wait` returned `None`.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        warn!(pid, error = %io::Error::last_os_error(), "failed to send SIGTERM to relay");
    }
    rc == 0
}

#[cfg(not(unix))]
fn send_terminate_signal(_child: &Child) -> bool {
    false
}
