//! Daemonisation backend for the `gafferd` process.

use std::ffi::OsStr;

use daemonize_me::Daemon;
use tracing::info;

use gaffer_config::RuntimePaths;

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Abstraction over daemonisation strategies.
pub(crate) trait Daemonizer: Send + Sync {
    /// Detaches the process into the background.
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), LaunchError>;
}

/// Daemoniser that delegates to `daemonize-me`.
#[derive(Debug, Default)]
pub(crate) struct SystemDaemonizer;

impl SystemDaemonizer {
    pub(crate) fn new() -> Self {
        Self
    }
}

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), LaunchError> {
        info!(
            target: PROCESS_TARGET,
            runtime = %paths.runtime_dir().display(),
            "daemonising into background"
        );
        let mut daemon = Daemon::new();
        daemon = daemon.work_dir(paths.runtime_dir());
        daemon = daemon.name(OsStr::new(env!("CARGO_PKG_NAME")));
        daemon.start()?;
        info!(
            target: PROCESS_TARGET,
            "daemon process detached; continuing in child"
        );
        Ok(())
    }
}

/// Daemoniser that stays attached; used in foreground mode and tests.
#[derive(Debug, Default)]
pub(crate) struct NoopDaemonizer;

impl Daemonizer for NoopDaemonizer {
    fn daemonize(&self, _paths: &RuntimePaths) -> Result<(), LaunchError> {
        Ok(())
    }
}
