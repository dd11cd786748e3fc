use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

use gaffer_config::{RuntimePathsError, SocketPreparationError};

use crate::health::HealthReadError;

/// Errors raised while delivering a payload to the daemon.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The socket exists but this user may not connect to it.
    #[error("permission denied connecting to '{endpoint}'")]
    PermissionDenied { endpoint: String },
    /// No daemon answered and bootstrapping was not requested.
    #[error("no daemon listening on '{endpoint}'")]
    NoDaemon { endpoint: String },
    /// Connecting to the daemon failed for a reason other than absence.
    #[error("failed to connect to '{endpoint}': {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    /// Writing the payload failed mid-delivery.
    #[error("failed to send payload to '{endpoint}': {source}")]
    Send {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    /// A daemon was bootstrapped but the retried delivery still failed.
    #[error("could not reach daemon even after bootstrapping one")]
    CouldNotReachServer(#[source] Box<DeliveryError>),
    /// Bootstrapping a daemon failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// Errors raised while bootstrapping a daemon on demand.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Spawning the daemon binary failed.
    #[error("failed to launch daemon binary '{binary}': {source}", binary = .binary.to_string_lossy())]
    LaunchDaemon {
        binary: OsString,
        #[source]
        source: std::io::Error,
    },
    /// The daemon exited before reporting readiness.
    #[error("daemon exited during startup with status {exit_status:?}")]
    StartupFailed { exit_status: Option<i32> },
    /// Polling the spawned daemon failed.
    #[error("failed to monitor spawned daemon: {source}")]
    MonitorChild {
        #[source]
        source: std::io::Error,
    },
    /// The daemon never became ready within the startup window.
    #[error("daemon did not become ready within {timeout_ms}ms (health file '{health_path}')")]
    StartupTimeout {
        health_path: PathBuf,
        timeout_ms: u64,
    },
    /// Runtime paths could not be derived for health polling.
    #[error(transparent)]
    RuntimePaths(#[from] RuntimePathsError),
    /// The socket directory could not be prepared.
    #[error(transparent)]
    SocketPreparation(#[from] SocketPreparationError),
    /// The health snapshot could not be read or parsed.
    #[error(transparent)]
    Health(#[from] HealthReadError),
}

/// Errors raised by daemon lifecycle commands (`stop`, `status`).
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Runtime paths could not be derived.
    #[error(transparent)]
    RuntimePaths(#[from] RuntimePathsError),
    /// The PID file could not be read.
    #[error("failed to read pid file '{path}': {source}")]
    ReadPid {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The PID file held something other than a process id.
    #[error("failed to parse pid file '{path}': {source}")]
    ParsePid {
        path: PathBuf,
        #[source]
        source: std::num::ParseIntError,
    },
    /// No daemon appears to be running.
    #[error("no running daemon found (pid file '{path}' absent)")]
    NotRunning { path: PathBuf },
    /// Signalling the daemon process failed.
    #[error("failed to signal daemon process {pid}: {source}")]
    SignalFailed {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
    /// The daemon did not shut down within the wait window.
    #[error("daemon did not shut down within {timeout_ms}ms (pid file '{pid_path}')")]
    ShutdownTimeout { pid_path: PathBuf, timeout_ms: u64 },
    /// The health snapshot could not be read or parsed.
    #[error(transparent)]
    Health(#[from] HealthReadError),
}
