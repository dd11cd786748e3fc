//! Daemon process supervision: daemonisation, lock/pid/health artefacts,
//! privilege drop, and launch sequencing.

pub(crate) mod daemonizer;
mod errors;
mod guard;
pub(crate) mod launch;
pub(crate) mod privileges;

pub use errors::LaunchError;
pub use launch::{LaunchMode, run_daemon};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const FOREGROUND_ENV_VAR: &str = "GAFFER_FOREGROUND";
