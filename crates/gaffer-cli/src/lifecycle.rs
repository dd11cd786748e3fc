//! Daemon lifecycle commands: stop and status.
//!
//! Both operate through the runtime artefacts the daemon writes next to its
//! socket. Stopping signals the pid from the pid file (SIGTERM for a
//! graceful drain, SIGQUIT for an immediate kill) and waits for the
//! artefacts to disappear; status combines the health snapshot with a live
//! connect probe so a stale snapshot cannot masquerade as a running daemon.

use std::fs;
use std::io;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use gaffer_config::{Config, RuntimePaths, SocketEndpoint};

use crate::errors::LifecycleError;
use crate::health::{HealthSnapshot, read_health};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the daemon should be brought down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Finish queued work, then exit (SIGTERM).
    Drain,
    /// Abandon queued work and exit promptly (SIGQUIT).
    Kill,
}

impl StopKind {
    fn signal(self) -> libc::c_int {
        match self {
            Self::Drain => libc::SIGTERM,
            Self::Kill => libc::SIGQUIT,
        }
    }
}

/// Point-in-time view of the daemon for `status`.
#[derive(Debug)]
pub struct StatusReport {
    /// Last health snapshot the daemon wrote, if any.
    pub snapshot: Option<HealthSnapshot>,
    /// Whether something currently accepts connections on the socket.
    pub socket_reachable: bool,
}

impl StatusReport {
    /// True when a daemon both reports ready and answers the socket.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.socket_reachable
            && self
                .snapshot
                .as_ref()
                .is_some_and(|snapshot| snapshot.status == "ready")
    }
}

/// Signals the running daemon and waits for its artefacts to disappear.
pub fn stop_daemon(config: &Config, kind: StopKind) -> Result<u32, LifecycleError> {
    let paths = RuntimePaths::from_config(config)?;
    let Some(pid) = read_pid(paths.pid_path())? else {
        return Err(LifecycleError::NotRunning {
            path: paths.pid_path().to_path_buf(),
        });
    };
    debug!(pid, ?kind, "signalling daemon");
    signal_process(pid, kind.signal())?;
    wait_for_shutdown(&paths, config.daemon_socket())?;
    Ok(pid)
}

/// Reports the daemon's health snapshot and socket reachability.
pub fn daemon_status(config: &Config) -> Result<StatusReport, LifecycleError> {
    let paths = RuntimePaths::from_config(config)?;
    let snapshot = read_health(paths.health_path())?;
    let socket_reachable = socket_is_reachable(config.daemon_socket());
    Ok(StatusReport {
        snapshot,
        socket_reachable,
    })
}

fn read_pid(path: &Path) -> Result<Option<u32>, LifecycleError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u32>()
                .map(Some)
                .map_err(|source| LifecycleError::ParsePid {
                    path: path.to_path_buf(),
                    source,
                })
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LifecycleError::ReadPid {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn signal_process(pid: u32, signal: libc::c_int) -> Result<(), LifecycleError> {
    // SAFETY: kill(2) is memory-safe for any pid value; an invalid pid just
    // produces an error return.
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(LifecycleError::SignalFailed {
            pid,
            source: io::Error::last_os_error(),
        })
    }
}

fn wait_for_shutdown(
    paths: &RuntimePaths,
    endpoint: &SocketEndpoint,
) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while Instant::now() < deadline {
        if !paths.pid_path().exists() && !socket_is_reachable(endpoint) {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::ShutdownTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout_ms: u64::try_from(SHUTDOWN_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
    })
}

fn socket_is_reachable(endpoint: &SocketEndpoint) -> bool {
    UnixStream::connect(endpoint.path()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    fn config_in(dir: &tempfile::TempDir) -> Config {
        Config {
            socket: SocketEndpoint::new(dir.path().join("gafferd.sock").to_str().unwrap()),
            ..Config::default()
        }
    }

    #[test]
    fn read_pid_handles_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_pid(&dir.path().join("gafferd.pid")).unwrap(), None);
    }

    #[test]
    fn read_pid_parses_integer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.pid");
        fs::write(&path, b"42\n").unwrap();
        assert_eq!(read_pid(&path).unwrap(), Some(42));
    }

    #[test]
    fn read_pid_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.pid");
        fs::write(&path, b"not a pid").unwrap();
        assert!(matches!(
            read_pid(&path).unwrap_err(),
            LifecycleError::ParsePid { .. }
        ));
    }

    #[test]
    fn stop_without_pid_file_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let error = stop_daemon(&config_in(&dir), StopKind::Drain).unwrap_err();
        assert!(matches!(error, LifecycleError::NotRunning { .. }));
    }

    #[test]
    fn status_reflects_snapshot_and_socket() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let report = daemon_status(&config).unwrap();
        assert!(!report.is_running());

        let paths = RuntimePaths::from_config(&config).unwrap();
        fs::write(
            paths.health_path(),
            format!(
                r#"{{"status":"ready","pid":{},"timestamp":1700000000}}"#,
                std::process::id()
            ),
        )
        .unwrap();
        let _listener = UnixListener::bind(config.daemon_socket().path()).unwrap();
        let report = daemon_status(&config).unwrap();
        assert!(report.is_running());
    }
}
