//! Work-unit capability executed inside forked worker processes.

use std::io::{self, Write};
use std::process::{Command, Stdio};

use thiserror::Error;

/// A unit of work the daemon runs once per submitted payload.
///
/// Implementations are injected at daemon construction and invoked inside
/// the forked child, so a panicking or crashing workload can never corrupt
/// the daemon or sibling workers. The worker's process exit code is the
/// sole signal the pool manager observes. Because a fork only carries the
/// forking thread across, implementations must not log through the process
/// tracing subscriber: its sink lock may be held by a thread that no longer
/// exists in the child.
pub trait Workload: Send + Sync + 'static {
    /// Runs one payload to completion.
    fn run(&self, payload: &[u8]) -> Result<(), WorkloadError>;
}

/// Errors surfaced by workload execution.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// Spawning the configured command failed.
    #[error("failed to spawn worker command '{command}': {source}")]
    Spawn {
        /// Configured command line.
        command: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the payload to the command's stdin failed.
    #[error("failed to feed payload to worker command: {source}")]
    FeedPayload {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Waiting for the command failed.
    #[error("failed to await worker command: {source}")]
    Await {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The command ran but reported failure.
    #[error("worker command exited with status {status:?}")]
    CommandFailed {
        /// Exit code when the command terminated normally.
        status: Option<i32>,
    },
}

/// Workload that runs a shell command with the payload piped to stdin.
#[derive(Debug, Clone)]
pub struct CommandWorkload {
    command: String,
}

impl CommandWorkload {
    /// Builds a workload around a shell command line.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Workload for CommandWorkload {
    fn run(&self, payload: &[u8]) -> Result<(), WorkloadError> {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| WorkloadError::Spawn {
                command: self.command.clone(),
                source,
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload)
                .map_err(|source| WorkloadError::FeedPayload { source })?;
        }
        let status = child
            .wait()
            .map_err(|source| WorkloadError::Await { source })?;
        if !status.success() {
            return Err(WorkloadError::CommandFailed {
                status: status.code(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_receives_payload_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("payload.txt");
        let workload = CommandWorkload::new(format!("cat > {}", output.display()));
        workload.run(b"hello worker").unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"hello worker");
    }

    #[test]
    fn failing_command_reports_status() {
        let workload = CommandWorkload::new("exit 3");
        let error = workload.run(b"").unwrap_err();
        assert!(matches!(
            error,
            WorkloadError::CommandFailed { status: Some(3) }
        ));
    }
}
