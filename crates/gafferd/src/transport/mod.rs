//! Socket transport: endpoint binding and connection intake.
//!
//! The listener owns the rendezvous socket artefact, detects stale
//! artefacts left by dead daemons, and accepts connections on a background
//! thread. Accepted payloads flow straight into the admission queue; the
//! transport never blocks on worker availability.

mod errors;
mod handler;
mod listener;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, IntakeHandler};
pub(crate) use self::listener::{ListenerHandle, SocketListener, remove_socket_artefact};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
