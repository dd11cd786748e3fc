use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Filesystem rendezvous address for the daemon socket.
///
/// At most one live daemon binds a given path at a time; a path with no
/// responsive listener is reclaimable by the next daemon to start.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SocketEndpoint {
    path: Utf8PathBuf,
}

impl SocketEndpoint {
    /// Builds an endpoint from a socket path.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the socket artefact.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_ref()
    }

    /// Ensures the socket's parent directory exists with restrictive permissions.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(parent) = self.path.parent() else {
            return Err(SocketPreparationError::MissingParent {
                path: self.path.clone(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        Ok(())
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unix://{}", self.path)
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if !input.contains("://") {
            if input.is_empty() {
                return Err(SocketParseError::MissingPath(input.to_owned()));
            }
            return Ok(Self::new(input));
        }
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                // "unix://relative/sock" parses with "relative" as the host
                // and "/sock" as the path; silently dropping the host would
                // bind somewhere the caller did not name.
                if let Some(host) = url.host_str().filter(|host| !host.is_empty()) {
                    return Err(SocketParseError::UnexpectedHost(host.to_owned()));
                }
                let path = url.path();
                if path.is_empty() {
                    return Err(SocketParseError::MissingPath(input.to_owned()));
                }
                Ok(Self::new(path))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was not recognised.
    #[error("unsupported socket scheme '{0}'; only unix:// endpoints are supported")]
    UnsupportedScheme(String),
    /// Socket path was absent.
    #[error("missing socket path in '{0}'")]
    MissingPath(String),
    /// URL carried a host component, so part of the path would be lost.
    #[error("unexpected host '{0}' in unix:// endpoint; use unix:///absolute/path")]
    UnexpectedHost(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Parent directory is missing when creating the socket path.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    /// Failed to create or adjust socket directories.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_unix_scheme() {
        let endpoint = SocketEndpoint::new("/tmp/gaffer/gafferd.sock");
        assert_eq!(endpoint.to_string(), "unix:///tmp/gaffer/gafferd.sock");
    }

    #[test]
    fn parse_accepts_unix_url() {
        let endpoint: SocketEndpoint = "unix:///run/gaffer/gafferd.sock".parse().unwrap();
        assert_eq!(endpoint.path(), "/run/gaffer/gafferd.sock");
    }

    #[test]
    fn parse_accepts_bare_path() {
        let endpoint: SocketEndpoint = "/tmp/gafferd.sock".parse().unwrap();
        assert_eq!(endpoint.path(), "/tmp/gafferd.sock");
    }

    #[test]
    fn parse_rejects_host_bearing_unix_url() {
        let error = "unix://relative/sock".parse::<SocketEndpoint>().unwrap_err();
        match error {
            SocketParseError::UnexpectedHost(host) => assert_eq!(host, "relative"),
            other => panic!("expected UnexpectedHost, got: {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_other_schemes() {
        let error = "tcp://127.0.0.1:9000".parse::<SocketEndpoint>().unwrap_err();
        assert!(matches!(error, SocketParseError::UnsupportedScheme(_)));
    }

    #[test]
    fn prepare_filesystem_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/gafferd.sock");
        let endpoint = SocketEndpoint::new(path.to_str().unwrap());
        endpoint.prepare_filesystem().unwrap();
        assert!(path.parent().unwrap().is_dir());
    }
}
