//! Bounded worker pool: fork-per-job execution with admission control.
//!
//! A single manager loop pops payloads off the admission queue, launches one
//! isolated worker process per payload, and never lets the outstanding set
//! grow past the configured ceiling. Reaping is asynchronous: each worker
//! gets its own reaper thread so a slow job never gates the manager beyond
//! the ceiling check itself.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use nix::errno::Errno;
use nix::sys::signal::{SigHandler, Signal, kill, signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, fork, write};
use tracing::{error, info, warn};

use crate::queue::AdmissionQueue;
use crate::workload::Workload;

const POOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pool");

/// Identifier of one launched worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerPid(pub i32);

/// Terminal observation of one worker, as seen by its reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Worker exited with the given status code.
    Exited(i32),
    /// Worker was terminated by the given signal number.
    Signalled(i32),
    /// The worker vanished without a collectable status.
    Lost,
}

/// Launches, reaps, and terminates worker processes.
///
/// The production launcher forks; tests substitute a thread-backed fake so
/// pool semantics are exercised without process creation.
pub trait WorkerLauncher: Send + Sync + 'static {
    /// Starts one worker for the payload, returning its handle.
    fn launch(&self, payload: Vec<u8>) -> Result<WorkerPid, LaunchWorkerError>;

    /// Blocks until the worker exits and returns its terminal status.
    /// Called exactly once per launched worker.
    fn reap(&self, pid: WorkerPid) -> ReapOutcome;

    /// Sends a termination signal; a worker that already exited is fine.
    fn terminate(&self, pid: WorkerPid);
}

/// Error launching a worker process.
#[derive(Debug, thiserror::Error)]
#[error("failed to fork worker process: {source}")]
pub struct LaunchWorkerError {
    /// Underlying OS error.
    #[source]
    pub source: Errno,
}

/// Descriptor of the daemon's listening socket, shared with the launcher so
/// forked children can close their inherited copy. Cleared (set negative)
/// once the listener itself has shut down.
#[derive(Debug, Clone)]
pub(crate) struct InheritedListenerFd(Arc<AtomicI32>);

impl InheritedListenerFd {
    pub(crate) fn new(fd: i32) -> Self {
        Self(Arc::new(AtomicI32::new(fd)))
    }

    pub(crate) fn clear(&self) {
        self.0.store(-1, Ordering::SeqCst);
    }

    fn get(&self) -> Option<i32> {
        let fd = self.0.load(Ordering::SeqCst);
        (fd >= 0).then_some(fd)
    }
}

/// Fork-based launcher running the injected workload in the child.
pub(crate) struct SystemLauncher {
    workload: Arc<dyn Workload>,
    listener_fd: InheritedListenerFd,
}

impl SystemLauncher {
    pub(crate) fn new(workload: Arc<dyn Workload>, listener_fd: InheritedListenerFd) -> Self {
        Self {
            workload,
            listener_fd,
        }
    }
}

impl WorkerLauncher for SystemLauncher {
    fn launch(&self, payload: Vec<u8>) -> Result<WorkerPid, LaunchWorkerError> {
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(WorkerPid(child.as_raw())),
            Ok(ForkResult::Child) => {
                // Only the forking thread survives into the child: any other
                // thread that held the log sink's lock is gone with the lock
                // still taken, so the child must never log through tracing.
                // Diagnostics go straight to stderr with raw writes.
                reset_signal_dispositions();
                if let Some(fd) = self.listener_fd.get() {
                    let _ = close(fd);
                }
                let status = match self.workload.run(&payload) {
                    Ok(()) => 0,
                    Err(workload_error) => {
                        let message = format!("gafferd worker: {workload_error}\n");
                        let _ = write(std::io::stderr(), message.as_bytes());
                        1
                    }
                };
                std::process::exit(status);
            }
            Err(source) => Err(LaunchWorkerError { source }),
        }
    }

    fn reap(&self, pid: WorkerPid) -> ReapOutcome {
        loop {
            match waitpid(Pid::from_raw(pid.0), None) {
                Ok(WaitStatus::Exited(_, status)) => return ReapOutcome::Exited(status),
                Ok(WaitStatus::Signaled(_, sig, _)) => return ReapOutcome::Signalled(sig as i32),
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(_) => return ReapOutcome::Lost,
            }
        }
    }

    fn terminate(&self, pid: WorkerPid) {
        match kill(Pid::from_raw(pid.0), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => warn!(
                target: POOL_TARGET,
                pid = pid.0,
                errno = %errno,
                "failed to signal worker"
            ),
        }
    }
}

/// Restores default signal dispositions in the forked child.
///
/// The daemon's signal-hook handlers are inherited through fork; without
/// this, a drain signal aimed at the daemon would be swallowed by a handler
/// that no longer has anyone reading its events.
fn reset_signal_dispositions() {
    for sig in [
        Signal::SIGHUP,
        Signal::SIGINT,
        Signal::SIGTERM,
        Signal::SIGQUIT,
    ] {
        let _ = unsafe { signal(sig, SigHandler::SigDfl) };
    }
}

#[derive(Debug, Default)]
struct Outstanding {
    pids: Mutex<HashSet<WorkerPid>>,
    changed: Condvar,
}

impl Outstanding {
    fn lock(&self) -> MutexGuard<'_, HashSet<WorkerPid>> {
        match self.pids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn insert(&self, pid: WorkerPid) {
        self.lock().insert(pid);
    }

    fn remove(&self, pid: WorkerPid) {
        self.lock().remove(&pid);
        self.changed.notify_all();
    }

    fn wait_below(&self, ceiling: usize, stopping: &AtomicBool) {
        let mut pids = self.lock();
        while pids.len() >= ceiling && !stopping.load(Ordering::SeqCst) {
            pids = match self.changed.wait(pids) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn wait_empty(&self) {
        let mut pids = self.lock();
        while !pids.is_empty() {
            pids = match self.changed.wait(pids) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn snapshot(&self) -> Vec<WorkerPid> {
        self.lock().iter().copied().collect()
    }

    fn count(&self) -> usize {
        self.lock().len()
    }
}

/// Pool manager coordinating the queue against the concurrency ceiling.
pub struct WorkerPool {
    queue: Arc<AdmissionQueue>,
    launcher: Arc<dyn WorkerLauncher>,
    ceiling: usize,
    outstanding: Arc<Outstanding>,
    stopping: AtomicBool,
}

impl WorkerPool {
    /// Builds a pool over the queue with the given launcher and ceiling.
    ///
    /// A ceiling of zero would deadlock the manager; it is clamped to one.
    #[must_use]
    pub fn new(
        queue: Arc<AdmissionQueue>,
        launcher: Arc<dyn WorkerLauncher>,
        ceiling: usize,
    ) -> Self {
        Self {
            queue,
            launcher,
            ceiling: ceiling.max(1),
            outstanding: Arc::new(Outstanding::default()),
            stopping: AtomicBool::new(false),
        }
    }

    /// Starts the manager loop on its own thread.
    ///
    /// The loop exits when the queue is closed and drained; call
    /// [`await_idle`] afterwards to wait for outstanding workers.
    ///
    /// [`await_idle`]: WorkerPool::await_idle
    pub fn start(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let pool = Arc::clone(self);
        thread::spawn(move || pool.run_loop())
    }

    fn run_loop(&self) {
        info!(
            target: POOL_TARGET,
            ceiling = self.ceiling,
            "worker pool manager running"
        );
        loop {
            self.outstanding.wait_below(self.ceiling, &self.stopping);
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            let Some(payload) = self.queue.pop() else {
                break;
            };
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            match self.launcher.launch(payload) {
                Ok(pid) => {
                    self.outstanding.insert(pid);
                    info!(target: POOL_TARGET, pid = pid.0, "worker launched");
                    self.spawn_reaper(pid);
                }
                Err(launch_error) => {
                    // The payload is gone; isolation means we do not retry.
                    error!(
                        target: POOL_TARGET,
                        error = %launch_error,
                        "failed to launch worker"
                    );
                }
            }
        }
        info!(target: POOL_TARGET, "worker pool manager stopped");
    }

    fn spawn_reaper(&self, pid: WorkerPid) {
        let launcher = Arc::clone(&self.launcher);
        let outstanding = Arc::clone(&self.outstanding);
        thread::spawn(move || {
            let outcome = launcher.reap(pid);
            match outcome {
                ReapOutcome::Exited(0) => {
                    info!(target: POOL_TARGET, pid = pid.0, "worker exited cleanly");
                }
                ReapOutcome::Exited(status) => {
                    warn!(
                        target: POOL_TARGET,
                        pid = pid.0,
                        status,
                        "worker exited with non-zero status"
                    );
                }
                ReapOutcome::Signalled(sig) => {
                    warn!(
                        target: POOL_TARGET,
                        pid = pid.0,
                        signal = sig,
                        "worker terminated by signal"
                    );
                }
                ReapOutcome::Lost => {
                    warn!(target: POOL_TARGET, pid = pid.0, "worker status lost");
                }
            }
            outstanding.remove(pid);
        });
    }

    /// Tells the manager loop to stop launching, waking it if it is parked
    /// against the ceiling. Join the manager thread after calling this and
    /// before fanning out termination signals, so the outstanding snapshot
    /// cannot miss a launch still in flight.
    pub fn halt(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.outstanding.changed.notify_all();
    }

    /// Sends a termination signal to every outstanding worker.
    pub fn terminate_outstanding(&self) {
        let pids = self.outstanding.snapshot();
        info!(
            target: POOL_TARGET,
            workers = pids.len(),
            "terminating outstanding workers"
        );
        for pid in pids {
            self.launcher.terminate(pid);
        }
    }

    /// Blocks until every outstanding worker has been reaped.
    pub fn await_idle(&self) {
        self.outstanding.wait_empty();
    }

    /// Number of launched-but-unreaped workers.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.count()
    }
}
