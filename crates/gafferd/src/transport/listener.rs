//! Listener implementation for the daemon rendezvous socket.

use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use gaffer_config::SocketEndpoint;

use super::{ConnectionHandler, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const SOCKET_MODE: u32 = 0o770;

/// Listener bound to the rendezvous socket.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    listener: UnixListener,
}

impl SocketListener {
    /// Binds the endpoint, reclaiming a stale artefact when nothing answers.
    ///
    /// An artefact with a live peer fails with [`ListenerError::AddressInUse`];
    /// an artefact that refuses connections is deleted and rebound. Two
    /// daemons racing this check-then-bind sequence is tolerated because the
    /// bootstrap path treats a lost race as "someone else is listening".
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let listener = bind_unix(endpoint.path().as_std_path())?;
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Raw descriptor of the listening socket.
    ///
    /// Forked workers close their inherited copy so a worker can never
    /// accept connections meant for the daemon.
    pub(crate) fn raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    /// Starts the accept loop on a background thread.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        if let Err(error) = self.listener.set_nonblocking(true) {
            remove_socket_artefact(&self.endpoint);
            return Err(ListenerError::NonBlocking { source: error });
        }
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_accept_loop(&self, shutdown_flag, handler));
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept-loop thread.
pub(crate) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop. The socket artefact stays on disk;
    /// callers remove it via [`remove_socket_artefact`] once no worker
    /// depends on the daemon still appearing bound.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => Ok(()),
                Err(_) => Err(ListenerError::ThreadPanic),
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: Arc<AtomicBool>,
    handler: Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let handler = Arc::clone(&handler);
                thread::spawn(move || handler.handle(stream));
            }
            Ok(None) => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    // The artefact is deliberately left in place: on a graceful drain it
    // must outlive the accept loop until the last worker exits, so its
    // removal belongs to the launch sequencer.
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "socket listener stopped"
    );
}

fn accept_connection(listener: &SocketListener) -> Result<Option<UnixStream>, io::Error> {
    match listener.listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::Metadata {
            path: path.display().to_string(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::NotSocket {
                path: path.display().to_string(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenerError::AddressInUse {
                    path: path.display().to_string(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound =>
            {
                info!(
                    target: LISTENER_TARGET,
                    path = %path.display(),
                    "reclaiming stale socket artefact"
                );
                fs::remove_file(path).map_err(|source| ListenerError::Cleanup {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            Err(error) => {
                return Err(ListenerError::Probe {
                    path: path.display().to_string(),
                    source: error,
                });
            }
        }
    }

    let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        path: path.display().to_string(),
        source,
    })?;
    fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE)).map_err(|source| {
        ListenerError::Permissions {
            path: path.display().to_string(),
            source,
        }
    })?;
    Ok(listener)
}

/// Removes the socket artefact; a missing artefact is not an error.
pub(crate) fn remove_socket_artefact(endpoint: &SocketEndpoint) {
    if let Err(error) = fs::remove_file(endpoint.path().as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %endpoint.path(),
            "failed to remove socket artefact"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ConnectionHandler for CountingHandler {
        fn handle(&self, _stream: UnixStream) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn listener_accepts_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.sock");
        let endpoint = SocketEndpoint::new(path.to_str().unwrap());
        let listener = SocketListener::bind(&endpoint).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler {
            count: Arc::clone(&count),
        });
        let handle = listener.start(handler).unwrap();

        let mut first = UnixStream::connect(&path).unwrap();
        first.write_all(b"one").unwrap();
        drop(first);
        let mut second = UnixStream::connect(&path).unwrap();
        second.write_all(b"two").unwrap();
        drop(second);

        assert!(wait_for_count(&count, 2), "expected two connections");
        handle.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn bind_reclaims_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.sock");
        {
            let _stale = UnixListener::bind(&path).unwrap();
        }
        assert!(path.exists(), "stale socket should remain");

        let endpoint = SocketEndpoint::new(path.to_str().unwrap());
        let listener = SocketListener::bind(&endpoint).unwrap();
        drop(listener);
        // The artefact belongs to the new daemon until its accept loop exits.
        assert!(path.exists());
    }

    #[test]
    fn bind_rejects_live_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.sock");
        let _existing = UnixListener::bind(&path).unwrap();

        let endpoint = SocketEndpoint::new(path.to_str().unwrap());
        let error = SocketListener::bind(&endpoint).unwrap_err();
        assert!(matches!(error, ListenerError::AddressInUse { .. }));
    }

    #[test]
    fn bind_rejects_non_socket_artefact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.sock");
        fs::write(&path, b"not a socket").unwrap();

        let endpoint = SocketEndpoint::new(path.to_str().unwrap());
        let error = SocketListener::bind(&endpoint).unwrap_err();
        assert!(matches!(error, ListenerError::NotSocket { .. }));
    }

    #[test]
    fn stopped_accept_loop_leaves_artefact_until_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gafferd.sock");
        let endpoint = SocketEndpoint::new(path.to_str().unwrap());
        let listener = SocketListener::bind(&endpoint).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = listener
            .start(Arc::new(CountingHandler {
                count: Arc::clone(&count),
            }))
            .unwrap();

        handle.shutdown();
        handle.join().unwrap();
        // Removal is the supervisor's call; draining workers may still be
        // running when the loop exits.
        assert!(path.exists(), "artefact outlives the accept loop");

        remove_socket_artefact(&endpoint);
        assert!(!path.exists());
        // Removing an already-removed artefact is harmless.
        remove_socket_artefact(&endpoint);
    }
}
