//! On-demand daemon bootstrapping.
//!
//! When delivery finds no listener on the rendezvous socket, the client can
//! spawn a daemon itself, wait for the health snapshot to report readiness,
//! and then retry the delivery exactly once.

use std::env;
use std::ffi::OsString;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use camino::Utf8PathBuf;
use tracing::debug;

use gaffer_config::{Config, RuntimePaths};

use crate::errors::BootstrapError;
use crate::health::{HealthSnapshot, read_health};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable overriding the daemon binary the client spawns.
pub const DAEMON_BIN_ENV_VAR: &str = "GAFFERD_BIN";

/// What the spawned daemon should run and where it should listen.
///
/// These settings become `gafferd` command-line flags; the socket always
/// comes from the client's own configuration so both sides agree on the
/// rendezvous path.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Shell command each worker runs with the payload on stdin.
    pub worker_command: String,
    /// Concurrency ceiling forwarded to the daemon; daemon default if absent.
    pub max_workers: Option<usize>,
    /// Log destination forwarded to the daemon.
    pub log_path: Option<Utf8PathBuf>,
    /// Daemon binary override; `GAFFERD_BIN` or `gafferd` when absent.
    pub binary: Option<OsString>,
}

impl BootstrapOptions {
    /// Options that spawn a daemon running `worker_command`.
    #[must_use]
    pub fn new(worker_command: impl Into<String>) -> Self {
        Self {
            worker_command: worker_command.into(),
            max_workers: None,
            log_path: None,
            binary: None,
        }
    }
}

/// Spawns a daemon for the endpoint in `config` and waits until its health
/// snapshot reports `ready`.
pub fn bootstrap_daemon(
    config: &Config,
    options: &BootstrapOptions,
) -> Result<HealthSnapshot, BootstrapError> {
    config.daemon_socket().prepare_filesystem()?;
    let paths = RuntimePaths::from_config(config)?;
    let started_at = SystemTime::now();
    let mut child = spawn_daemon(config, options)?;
    debug!(pid = child.id(), "daemon spawned, awaiting readiness");
    wait_for_ready(&paths, &mut child, started_at)
}

fn spawn_daemon(config: &Config, options: &BootstrapOptions) -> Result<Child, BootstrapError> {
    let binary = daemon_binary(options);
    let mut command = Command::new(&binary);
    command
        .arg("--socket")
        .arg(config.daemon_socket().path().as_str())
        .arg("--command")
        .arg(&options.worker_command);
    if let Some(ceiling) = options.max_workers {
        command.arg("--max-workers").arg(ceiling.to_string());
    }
    if let Some(log_path) = &options.log_path {
        command.arg("--log").arg(log_path.as_str());
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
        .spawn()
        .map_err(|source| BootstrapError::LaunchDaemon { binary, source })
}

fn daemon_binary(options: &BootstrapOptions) -> OsString {
    options
        .binary
        .clone()
        .or_else(|| env::var_os(DAEMON_BIN_ENV_VAR))
        .unwrap_or_else(|| OsString::from("gafferd"))
}

fn wait_for_ready(
    paths: &RuntimePaths,
    child: &mut Child,
    started_at: SystemTime,
) -> Result<HealthSnapshot, BootstrapError> {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    while Instant::now() < deadline {
        if let Some(snapshot) = read_health(paths.health_path())? {
            // Ignore stale snapshots left by an earlier daemon on the same
            // socket; readiness must postdate our spawn.
            if snapshot_is_recent(&snapshot, started_at) && snapshot.status == "ready" {
                return Ok(snapshot);
            }
        }
        // The daemon forks into the background, so the spawned child is only
        // the foreground parent; a clean exit is part of daemonising.
        if let Some(status) = child
            .try_wait()
            .map_err(|source| BootstrapError::MonitorChild { source })?
            .filter(|status| !status.success())
        {
            return Err(BootstrapError::StartupFailed {
                exit_status: status.code(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(BootstrapError::StartupTimeout {
        health_path: paths.health_path().to_path_buf(),
        timeout_ms: u64::try_from(STARTUP_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
    })
}

fn snapshot_is_recent(snapshot: &HealthSnapshot, started_at: SystemTime) -> bool {
    // The snapshot timestamp is whole seconds; floor the spawn instant the
    // same way so a daemon that reports ready within the spawn second is
    // accepted rather than looking perpetually stale.
    let started_secs = started_at
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    snapshot.timestamp >= started_secs
}
