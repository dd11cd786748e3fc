//! Job-dispatch daemon core.
//!
//! `gafferd` accepts opaque job payloads on a Unix socket, queues them in
//! arrival order, and executes each payload in an isolated forked worker
//! process, never running more than the configured ceiling at once. The
//! daemon is driven by three cooperating activities: the connection intake
//! loop, the worker pool manager, and the signal-driven control plane
//! (log rotation, graceful drain, immediate kill).
//!
//! The crate exposes [`run_daemon`] for the binary and the collaborator
//! seams ([`Workload`], [`WorkerLauncher`], [`ControlSource`]) so tests can
//! substitute each piece independently.

mod control;
mod pool;
mod process;
mod queue;
mod telemetry;
mod transport;
mod workload;

pub use control::{ControlError, ControlEvent, ControlSource, SignalControlSource};
pub use pool::{LaunchWorkerError, ReapOutcome, WorkerLauncher, WorkerPid, WorkerPool};
pub use process::{LaunchError, LaunchMode, run_daemon};
pub use queue::AdmissionQueue;
pub use telemetry::{LogSink, LogWriter, TelemetryError};
pub use transport::ListenerError;
pub use workload::{CommandWorkload, Workload, WorkloadError};
