//! Client library for the gaffer job-dispatch daemon.
//!
//! The primary entry point is [`Client`]: connect to the rendezvous socket,
//! stream an opaque payload, and half-close. [`Client::deliver`] adds lazy
//! bootstrapping, spawning a daemon and retrying once when nothing is
//! listening. Lifecycle helpers ([`stop_daemon`], [`daemon_status`]) drive
//! the runtime artefacts the daemon maintains next to its socket.

mod bootstrap;
mod client;
mod errors;
mod health;
mod lifecycle;

pub use bootstrap::{BootstrapOptions, DAEMON_BIN_ENV_VAR, bootstrap_daemon};
pub use client::Client;
pub use errors::{BootstrapError, DeliveryError, LifecycleError};
pub use health::{HealthReadError, HealthSnapshot};
pub use lifecycle::{StatusReport, StopKind, daemon_status, stop_daemon};
