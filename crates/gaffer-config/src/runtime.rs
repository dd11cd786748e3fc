//! Derives runtime artefact paths shared by the CLI and daemon.
//!
//! The runtime directory houses the daemon lock, pid, and health snapshots.
//! Both binaries need to agree on the directory layout so lifecycle commands
//! can interact with the files written by the daemon supervisor.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

/// Canonical paths for runtime artefacts written by the daemon.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    health_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the shared configuration.
    ///
    /// Artefacts live next to the socket so a non-default socket path keeps
    /// its lock, pid, and health files with it.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let socket_path = config.socket.path();
        let runtime_dir = match socket_path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
        {
            Some(parent) => parent.as_std_path().to_path_buf(),
            None => {
                return Err(RuntimePathsError::MissingSocketParent {
                    path: socket_path.to_string(),
                });
            }
        };
        fs::create_dir_all(&runtime_dir).map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: runtime_dir.clone(),
            source,
        })?;
        Ok(Self {
            lock_path: runtime_dir.join("gafferd.lock"),
            pid_path: runtime_dir.join("gafferd.pid"),
            health_path: runtime_dir.join("gafferd.health"),
            runtime_dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Path to the lock file guarding singleton startup.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the health snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Path {
        self.health_path.as_path()
    }
}

/// Errors raised while deriving daemon runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// The socket path lacked a parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent { path: String },
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SocketEndpoint;

    #[test]
    fn derives_paths_next_to_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("gafferd.sock");
        let config = Config {
            socket: SocketEndpoint::new(socket.to_str().unwrap()),
            ..Config::default()
        };
        let paths = RuntimePaths::from_config(&config).unwrap();
        assert_eq!(paths.runtime_dir(), dir.path());
        assert!(paths.lock_path().ends_with("gafferd.lock"));
        assert!(paths.pid_path().ends_with("gafferd.pid"));
        assert!(paths.health_path().ends_with("gafferd.health"));
    }

    #[test]
    fn rejects_socket_without_parent() {
        let config = Config {
            socket: SocketEndpoint::new("gafferd.sock"),
            ..Config::default()
        };
        let error = RuntimePaths::from_config(&config).unwrap_err();
        assert!(matches!(
            error,
            RuntimePathsError::MissingSocketParent { .. }
        ));
    }
}
