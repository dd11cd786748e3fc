//! Error types for daemon launch and supervision.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use gaffer_config::{RuntimePathsError, SocketPreparationError};

use crate::control::ControlError;
use crate::telemetry::TelemetryError;
use crate::transport::ListenerError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Initialising telemetry failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[from]
        source: TelemetryError,
    },
    /// The configured pre-start hook failed.
    #[error("pre-start hook '{command}' failed: {reason}")]
    PreStart {
        /// Configured hook command.
        command: String,
        /// Failure description.
        reason: String,
    },
    /// The configured group could not be resolved.
    #[error("unknown group '{name}'")]
    UnknownGroup {
        /// Configured group name.
        name: String,
    },
    /// The configured user could not be resolved.
    #[error("unknown user '{name}'")]
    UnknownUser {
        /// Configured user name.
        name: String,
    },
    /// Assuming the configured user or group failed.
    #[error("failed to drop privileges to {target}: {source}")]
    PrivilegeDrop {
        /// User or group being assumed.
        target: String,
        /// Underlying OS error.
        source: Errno,
    },
    /// Preparing the socket filesystem failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Underlying filesystem error.
        #[from]
        source: SocketPreparationError,
    },
    /// Deriving the runtime directory failed.
    #[error(transparent)]
    RuntimePaths(#[from] RuntimePathsError),
    /// Lock file creation failed.
    #[error("failed to create lock file '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A running daemon already holds the lock.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning {
        /// PID recorded in the existing PID file.
        pid: u32,
    },
    /// Removing a stale runtime artefact failed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        /// Path of the artefact that could not be removed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the PID file failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// PID file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the health snapshot failed.
    #[error("failed to write health snapshot '{path}': {source}")]
    HealthWrite {
        /// Health file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Serialising the health snapshot failed.
    #[error("failed to serialise health snapshot: {source}")]
    HealthSerialise {
        /// Underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
    /// Obtaining the current timestamp failed.
    #[error("failed to read system time: {source}")]
    Clock {
        /// Underlying system time error.
        #[source]
        source: std::time::SystemTimeError,
    },
    /// Attempting to probe an existing PID failed.
    #[error("failed to check existing process {pid}: {source}")]
    CheckProcess {
        /// PID that failed to probe.
        pid: u32,
        /// Underlying OS error.
        source: Errno,
    },
    /// Health updates were attempted before writing the PID file.
    #[error("pid must be written before updating health state")]
    MissingPid,
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[from]
        source: daemonize_me::DaemonError,
    },
    /// Wiring the control plane failed.
    #[error(transparent)]
    Control(#[from] ControlError),
    /// Binding or running the socket listener failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}
