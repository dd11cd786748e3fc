//! Error types for socket listener operations.

use std::io;

use thiserror::Error;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// A live daemon is already listening on the socket.
    #[error("another daemon is already listening on {path}")]
    AddressInUse {
        /// Socket path that refused the takeover.
        path: String,
    },
    /// The artefact at the socket path is not a socket.
    #[error("socket path {path} exists but is not a socket")]
    NotSocket {
        /// Offending path.
        path: String,
    },
    /// Reading metadata for the existing artefact failed.
    #[error("failed to read metadata for socket {path}: {source}")]
    Metadata {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing the existing artefact for a live peer failed.
    #[error("failed to probe existing socket {path}: {source}")]
    Probe {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale artefact failed.
    #[error("failed to remove stale socket {path}: {source}")]
    Cleanup {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Binding the socket failed.
    #[error("failed to bind socket at {path}: {source}")]
    Bind {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Restricting the socket artefact permissions failed.
    #[error("failed to set permissions on socket {path}: {source}")]
    Permissions {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept-loop thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
