//! Lock, pid, and health artefacts guarding the daemon singleton.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::Serialize;
use tracing::{info, warn};

use gaffer_config::RuntimePaths;

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Daemon lifecycle phase recorded in the health snapshot.
#[derive(Debug, Clone, Copy)]
pub(crate) enum HealthState {
    Starting,
    Ready,
    Draining,
    Stopping,
}

impl HealthState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopping => "stopping",
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthSnapshot<'a> {
    status: &'a str,
    pid: u32,
    timestamp: u64,
}

impl<'a> HealthSnapshot<'a> {
    fn new(state: HealthState, pid: u32) -> Result<Self, LaunchError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|source| LaunchError::Clock { source })?
            .as_secs();
        Ok(Self {
            status: state.as_str(),
            pid,
            timestamp,
        })
    }
}

/// Guard responsible for the lifecycle of lock, pid, and health files.
#[derive(Debug)]
pub(crate) struct ProcessGuard {
    paths: RuntimePaths,
    _lock: File,
    pid: Option<u32>,
}

impl ProcessGuard {
    /// Acquires the singleton lock, recovering from stale artefacts left by
    /// a dead daemon.
    pub(crate) fn acquire(paths: RuntimePaths) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self {
            paths,
            _lock: lock,
            pid: None,
        })
    }

    pub(crate) fn write_pid(&mut self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        let mut file = open_private(path).map_err(|source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        writeln!(file, "{pid}").map_err(|source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        file.sync_all().map_err(|source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        self.pid = Some(pid);
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }

    pub(crate) fn write_health(&self, status: HealthState) -> Result<(), LaunchError> {
        let pid = self.pid.ok_or(LaunchError::MissingPid)?;
        let path = self.paths.health_path();
        let mut file = open_private(path).map_err(|source| LaunchError::HealthWrite {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot = HealthSnapshot::new(status, pid)?;
        serde_json::to_writer(&mut file, &snapshot)?;
        file.write_all(b"\n")
            .map_err(|source| LaunchError::HealthWrite {
                path: path.to_path_buf(),
                source,
            })?;
        file.sync_all().map_err(|source| LaunchError::HealthWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            target: PROCESS_TARGET,
            status = snapshot.status,
            file = %path.display(),
            "health snapshot updated"
        );
        Ok(())
    }

    pub(crate) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for path in [
            self.paths.lock_path(),
            self.paths.pid_path(),
            self.paths.health_path(),
        ] {
            match fs::remove_file(path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => {
                    warn!(
                        target: PROCESS_TARGET,
                        file = %path.display(),
                        error = %error,
                        "failed to remove runtime artefact"
                    );
                }
                _ => {}
            }
        }
    }
}

fn open_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    match options.open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: PROCESS_TARGET,
                file = %paths.lock_path().display(),
                "acquired daemon lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    if let Some(pid) = read_pid(paths.pid_path())
        && pid != 0
    {
        match check_process(pid) {
            Ok(true) => {
                info!(
                    target: PROCESS_TARGET,
                    pid,
                    "refusing to start: existing daemon alive"
                );
                return Err(LaunchError::AlreadyRunning { pid });
            }
            Ok(false) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid,
                    "existing daemon not detected; cleaning stale files"
                );
            }
            Err(error) => return Err(error),
        }
    }
    remove_file(paths.lock_path())?;
    remove_file(paths.pid_path())?;
    acquire_lock(paths)
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn remove_file(path: &Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LaunchError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn check_process(pid: u32) -> Result<bool, LaunchError> {
    if pid == 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) | Err(Errno::ECHILD) => Ok(false),
        Err(errno) => Err(LaunchError::CheckProcess { pid, source: errno }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaffer_config::{Config, SocketEndpoint};

    fn temp_paths(dir: &tempfile::TempDir) -> RuntimePaths {
        let socket = dir.path().join("gafferd.sock");
        let config = Config {
            socket: SocketEndpoint::new(socket.to_str().unwrap()),
            ..Config::default()
        };
        RuntimePaths::from_config(&config).unwrap()
    }

    #[test]
    fn guard_writes_and_removes_artefacts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        {
            let mut guard = ProcessGuard::acquire(paths.clone()).unwrap();
            guard.write_pid(12345).unwrap();
            guard.write_health(HealthState::Ready).unwrap();
            assert!(paths.lock_path().exists());
            assert!(paths.pid_path().exists());
            let health = fs::read_to_string(paths.health_path()).unwrap();
            assert!(health.contains("\"ready\""));
            assert!(health.contains("12345"));
        }
        assert!(!paths.lock_path().exists());
        assert!(!paths.pid_path().exists());
        assert!(!paths.health_path().exists());
    }

    #[test]
    fn second_acquire_with_live_pid_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        let mut guard = ProcessGuard::acquire(paths.clone()).unwrap();
        guard.write_pid(std::process::id()).unwrap();

        let error = ProcessGuard::acquire(paths.clone()).unwrap_err();
        assert!(matches!(error, LaunchError::AlreadyRunning { .. }));
        drop(guard);
    }

    #[test]
    fn stale_lock_without_live_process_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        fs::write(paths.lock_path(), b"").unwrap();
        // A pid that cannot be running: pid files never record 0.
        fs::write(paths.pid_path(), b"0").unwrap();

        let guard = ProcessGuard::acquire(paths.clone()).unwrap();
        assert!(paths.lock_path().exists());
        drop(guard);
    }

    #[test]
    fn health_before_pid_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(&dir);
        let guard = ProcessGuard::acquire(paths).unwrap();
        let error = guard.write_health(HealthState::Starting).unwrap_err();
        assert!(matches!(error, LaunchError::MissingPid));
    }
}
