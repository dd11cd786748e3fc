//! Structured telemetry with a rotatable log sink.
//!
//! The subscriber writes through [`LogSink`], a handle that can reopen the
//! log file at its original path. Rotation swaps the file handle under a
//! lock, so concurrent writers never observe a half-closed handle.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8PathBuf;
use once_cell::sync::OnceCell;
use tracing::{Subscriber, info, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::MakeWriter;

use gaffer_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static TELEMETRY_SINK: OnceCell<LogSink> = OnceCell::new();

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to open the configured log file.
    #[error("failed to open log file '{path}': {source}")]
    OpenLog {
        /// Configured log path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

#[derive(Debug)]
enum SinkTarget {
    Stderr,
    File { path: Utf8PathBuf, file: File },
}

/// Swappable destination for all daemon log output.
#[derive(Debug, Clone)]
pub struct LogSink {
    target: Arc<Mutex<SinkTarget>>,
}

impl LogSink {
    fn stderr() -> Self {
        Self {
            target: Arc::new(Mutex::new(SinkTarget::Stderr)),
        }
    }

    fn file(path: Utf8PathBuf) -> Result<Self, TelemetryError> {
        let file = open_log_file(&path)?;
        Ok(Self {
            target: Arc::new(Mutex::new(SinkTarget::File { path, file })),
        })
    }

    fn writes_to_file(&self) -> bool {
        matches!(*self.lock_target(), SinkTarget::File { .. })
    }

    /// Closes and reopens the log file at its original path.
    ///
    /// Supports external rotation: after the old file has been renamed away,
    /// a reopen starts a fresh generation. A stderr sink is untouched;
    /// repeated reopens are idempotent.
    pub fn reopen(&self) -> Result<(), TelemetryError> {
        let mut target = self.lock_target();
        if let SinkTarget::File { path, file } = &mut *target {
            *file = open_log_file(path)?;
        }
        drop(target);
        info!(target: TELEMETRY_TARGET, "log sink reopened");
        Ok(())
    }

    fn lock_target(&self) -> MutexGuard<'_, SinkTarget> {
        match self.target.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn open_log_file(path: &Utf8PathBuf) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_std_path())
        .map_err(|source| TelemetryError::OpenLog {
            path: path.clone(),
            source,
        })
}

/// Writer handed to the subscriber for each event.
#[derive(Debug)]
pub struct LogWriter {
    target: Arc<Mutex<SinkTarget>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut target = match self.target.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &mut *target {
            SinkTarget::Stderr => io::stderr().write(buf),
            SinkTarget::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut target = match self.target.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &mut *target {
            SinkTarget::Stderr => io::stderr().flush(),
            SinkTarget::File { file, .. } => file.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            target: Arc::clone(&self.target),
        }
    }
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: the first invocation installs the global
/// subscriber; later invocations return a clone of the installed sink.
pub fn initialise(config: &Config) -> Result<LogSink, TelemetryError> {
    TELEMETRY_SINK
        .get_or_try_init(|| install_subscriber(config))
        .cloned()
}

fn install_subscriber(config: &Config) -> Result<LogSink, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let sink = match &config.log_path {
        Some(path) => LogSink::file(path.clone())?,
        None => LogSink::stderr(),
    };

    // Colour only belongs on an interactive stderr, never in a log file.
    let ansi = !sink.writes_to_file() && io::stderr().is_terminal();
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(sink.clone())
        .with_ansi(ansi)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_switches_to_fresh_file_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("gafferd.log")).unwrap();
        let sink = LogSink::file(path.clone()).unwrap();

        let mut writer = sink.make_writer();
        writer.write_all(b"before rotation\n").unwrap();
        writer.flush().unwrap();

        // External rotation renames the file away, then the sink reopens.
        let rotated = dir.path().join("gafferd.log.1");
        std::fs::rename(path.as_std_path(), &rotated).unwrap();
        sink.reopen().unwrap();

        let mut writer = sink.make_writer();
        writer.write_all(b"after rotation\n").unwrap();
        writer.flush().unwrap();

        let old = std::fs::read_to_string(&rotated).unwrap();
        let new = std::fs::read_to_string(path.as_std_path()).unwrap();
        assert!(old.contains("before rotation"));
        assert!(new.contains("after rotation"));
        assert!(!new.contains("before rotation"));
    }

    #[test]
    fn reopen_is_idempotent_for_stderr_sink() {
        let sink = LogSink::stderr();
        sink.reopen().unwrap();
        sink.reopen().unwrap();
    }
}
