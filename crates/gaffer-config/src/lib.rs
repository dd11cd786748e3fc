//! Shared configuration for the gaffer daemon and client.
//!
//! Both binaries need to agree on the socket endpoint, the runtime artefact
//! layout, and the logging settings, so those types live here. The daemon
//! consumes [`Config`] as an immutable value at startup; flag parsing happens
//! in the binaries, never in this crate.

mod config;
mod defaults;
mod logging;
mod runtime;
mod socket;

pub use config::Config;
pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_WORKERS, default_log_filter, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};
