//! Reading the daemon's health snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Health snapshot the daemon writes alongside its pid file.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Lifecycle phase: `starting`, `ready`, `draining`, or `stopping`.
    pub status: String,
    /// Process id of the daemon that wrote the snapshot.
    pub pid: u32,
    /// Seconds since the Unix epoch at write time.
    pub timestamp: u64,
}

/// Errors raised while reading a health snapshot.
#[derive(Debug, Error)]
pub enum HealthReadError {
    /// The snapshot file exists but could not be read.
    #[error("failed to read health snapshot '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The snapshot file was not valid JSON.
    #[error("failed to parse health snapshot '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads the health snapshot, treating a missing file as "no snapshot".
pub fn read_health(path: &Path) -> Result<Option<HealthSnapshot>, HealthReadError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| HealthReadError::Parse {
                path: path.to_path_buf(),
                source,
            }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(HealthReadError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.health");
        assert_eq!(read_health(&path).unwrap(), None);
    }

    #[test]
    fn parses_snapshot_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.health");
        fs::write(&path, r#"{"status":"ready","pid":42,"timestamp":1700000000}"#).unwrap();
        let snapshot = read_health(&path).unwrap().unwrap();
        assert_eq!(snapshot.status, "ready");
        assert_eq!(snapshot.pid, 42);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.health");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            read_health(&path).unwrap_err(),
            HealthReadError::Parse { .. }
        ));
    }
}
