//! Payload delivery to the daemon socket.
//!
//! Delivery is fire-and-forget: the client connects, streams the payload,
//! and half-closes the write side so the daemon sees end-of-file as the
//! payload boundary. No acknowledgement comes back.

use std::io::{self, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use tracing::debug;

use gaffer_config::{Config, SocketEndpoint};

use crate::bootstrap::{BootstrapOptions, bootstrap_daemon};
use crate::errors::DeliveryError;

/// Client handle bound to one daemon endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    endpoint: SocketEndpoint,
}

impl Client {
    /// Builds a client for the endpoint.
    #[must_use]
    pub fn new(endpoint: SocketEndpoint) -> Self {
        Self { endpoint }
    }

    /// Endpoint this client submits to.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Submits one payload to an already-running daemon.
    pub fn submit(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        let mut stream =
            UnixStream::connect(self.endpoint.path()).map_err(|error| self.classify(error))?;
        stream.write_all(payload).map_err(|source| DeliveryError::Send {
            endpoint: self.endpoint.to_string(),
            source,
        })?;
        stream
            .shutdown(Shutdown::Write)
            .map_err(|source| DeliveryError::Send {
                endpoint: self.endpoint.to_string(),
                source,
            })?;
        debug!(endpoint = %self.endpoint, bytes = payload.len(), "payload delivered");
        Ok(())
    }

    /// Submits one payload, spawning a daemon first if none is listening.
    ///
    /// A refused or absent socket triggers exactly one bootstrap-and-retry;
    /// a permission failure never does, because a daemon we spawn would
    /// listen somewhere this user cannot reach either.
    pub fn deliver(
        &self,
        payload: &[u8],
        config: &Config,
        options: &BootstrapOptions,
    ) -> Result<(), DeliveryError> {
        match self.submit(payload) {
            Ok(()) => Ok(()),
            Err(DeliveryError::NoDaemon { .. }) => {
                debug!(endpoint = %self.endpoint, "no daemon listening, bootstrapping");
                match bootstrap_daemon(config, options) {
                    Ok(_) => self
                        .submit(payload)
                        .map_err(|retry| DeliveryError::CouldNotReachServer(Box::new(retry))),
                    // A failed bootstrap may mean another client won the
                    // race to bind the socket; a listener being there now
                    // still satisfies the delivery.
                    Err(bootstrap_error) => match self.submit(payload) {
                        Ok(()) => Ok(()),
                        Err(_) => Err(DeliveryError::Bootstrap(bootstrap_error)),
                    },
                }
            }
            Err(other) => Err(other),
        }
    }

    fn classify(&self, error: io::Error) -> DeliveryError {
        let endpoint = self.endpoint.to_string();
        match error.kind() {
            io::ErrorKind::PermissionDenied => DeliveryError::PermissionDenied { endpoint },
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable => DeliveryError::NoDaemon { endpoint },
            _ => DeliveryError::Connect {
                endpoint,
                source: error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;
    use std::thread;

    fn endpoint_in(dir: &tempfile::TempDir) -> SocketEndpoint {
        SocketEndpoint::new(dir.path().join("gafferd.sock").to_str().unwrap())
    }

    #[test]
    fn submit_streams_payload_to_listener() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(&dir);
        let listener = UnixListener::bind(endpoint.path()).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).unwrap();
            received
        });

        Client::new(endpoint).submit(b"job payload").unwrap();
        assert_eq!(server.join().unwrap(), b"job payload");
    }

    #[test]
    fn missing_socket_classifies_as_no_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let error = Client::new(endpoint_in(&dir)).submit(b"x").unwrap_err();
        assert!(matches!(error, DeliveryError::NoDaemon { .. }));
    }

    #[test]
    fn lost_bootstrap_race_still_delivers() {
        use std::ffi::OsString;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(&dir);

        // A stand-in daemon binary that never becomes ready: it mimics a
        // launcher losing the bind race and giving up.
        let stub = dir.path().join("stuck-gafferd");
        std::fs::write(&stub, "#!/bin/sh\nsleep 1\nexit 7\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = Config {
            socket: endpoint.clone(),
            ..Config::default()
        };
        let mut options = BootstrapOptions::new("cat");
        options.binary = Some(OsString::from(stub.to_str().unwrap()));

        // A competing daemon binds while the stub is still failing.
        let socket_path = endpoint.path().to_path_buf();
        let server = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            let listener = UnixListener::bind(&socket_path).unwrap();
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).unwrap();
            received
        });

        Client::new(endpoint)
            .deliver(b"raced", &config, &options)
            .expect("a listener bound by someone else satisfies delivery");
        assert_eq!(server.join().unwrap(), b"raced");
    }

    #[test]
    fn abandoned_socket_classifies_as_no_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = endpoint_in(&dir);
        // Bind then drop: the artefact remains but nothing accepts.
        drop(UnixListener::bind(endpoint.path()).unwrap());
        let error = Client::new(endpoint).submit(b"x").unwrap_err();
        assert!(matches!(error, DeliveryError::NoDaemon { .. }));
    }
}
