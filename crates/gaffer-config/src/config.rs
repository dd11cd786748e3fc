use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_MAX_WORKERS, default_log_filter, default_socket_endpoint};
use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Immutable daemon configuration.
///
/// Assembled by the binaries (flag parsing lives there) and handed to the
/// daemon core at startup. The daemon never mutates it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Rendezvous socket the daemon binds and clients connect to.
    pub socket: SocketEndpoint,
    /// Admission ceiling: maximum number of concurrently running workers.
    pub max_workers: usize,
    /// Log destination; stderr when absent.
    pub log_path: Option<Utf8PathBuf>,
    /// Tracing filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// User to assume before binding the socket.
    pub run_as_user: Option<String>,
    /// Group to assume before binding the socket.
    pub run_as_group: Option<String>,
    /// Shell command executed by each worker with the payload on stdin.
    pub worker_command: Option<String>,
    /// Shell command executed once before the listener binds.
    pub pre_start: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: default_socket_endpoint(),
            max_workers: DEFAULT_MAX_WORKERS,
            log_path: None,
            log_filter: default_log_filter().to_owned(),
            log_format: LogFormat::default(),
            run_as_user: None,
            run_as_group: None,
            worker_command: None,
            pre_start: None,
        }
    }
}

impl Config {
    /// Socket endpoint the daemon binds.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.socket
    }

    /// Configured tracing filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Configured log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ceiling_is_one() {
        assert_eq!(Config::default().max_workers, 1);
    }

    #[test]
    fn default_socket_is_namespaced() {
        let endpoint = Config::default().socket;
        assert!(endpoint.path().as_str().ends_with("gafferd.sock"));
    }
}
