//! Daemon launch sequencing and runtime orchestration.

use std::env;
use std::process::Command;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use tracing::{error, info, warn};

use gaffer_config::{Config, RuntimePaths};

use crate::control::{ControlEvent, ControlSource, SignalControlSource};
use crate::pool::{InheritedListenerFd, SystemLauncher, WorkerPool};
use crate::queue::AdmissionQueue;
use crate::telemetry::{self, LogSink};
use crate::transport::{IntakeHandler, SocketListener, remove_socket_artefact};
use crate::workload::Workload;

use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::{HealthState, ProcessGuard};
use super::{FOREGROUND_ENV_VAR, PROCESS_TARGET};

/// Launch mode for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal; primarily used for debugging and tests.
    Foreground,
}

impl LaunchMode {
    /// Detects the mode from the environment.
    #[must_use]
    pub fn detect() -> Self {
        if env::var_os(FOREGROUND_ENV_VAR).is_some() {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

/// Process-level collaborators needed to control daemon lifecycle.
pub(crate) struct ProcessControl<D, C> {
    pub(crate) mode: LaunchMode,
    pub(crate) daemonizer: D,
    pub(crate) control: C,
}

/// Service dependencies required to construct the daemon runtime.
pub(crate) struct ServiceDeps {
    pub(crate) config: Config,
    pub(crate) workload: Arc<dyn Workload>,
}

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<D, C> {
    pub(crate) process: ProcessControl<D, C>,
    pub(crate) services: ServiceDeps,
}

/// How the control loop decided to bring the daemon down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownKind {
    Drain,
    Kill,
}

/// Runs the daemon using the production collaborators.
pub fn run_daemon(
    config: Config,
    workload: Arc<dyn Workload>,
    mode: LaunchMode,
) -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        process: ProcessControl {
            mode,
            daemonizer: SystemDaemonizer::new(),
            control: SignalControlSource::new(),
        },
        services: ServiceDeps { config, workload },
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<D, C>(plan: LaunchPlan<D, C>) -> Result<(), LaunchError>
where
    D: Daemonizer,
    C: ControlSource,
{
    let LaunchPlan { process, services } = plan;
    let ProcessControl {
        mode,
        daemonizer,
        control,
    } = process;
    let ServiceDeps { config, workload } = services;

    let sink = telemetry::initialise(&config)?;
    info!(
        target: PROCESS_TARGET,
        ?mode,
        endpoint = %config.daemon_socket(),
        ceiling = config.max_workers,
        "starting daemon runtime"
    );

    run_pre_start_hook(&config)?;
    super::privileges::drop_privileges(&config)?;
    config.daemon_socket().prepare_filesystem()?;
    let runtime_paths = RuntimePaths::from_config(&config)?;
    let mut guard = ProcessGuard::acquire(runtime_paths)?;
    if matches!(mode, LaunchMode::Background) {
        daemonizer.daemonize(guard.paths())?;
    }
    guard.write_pid(std::process::id())?;
    guard.write_health(HealthState::Starting)?;

    let events = control.subscribe()?;
    let listener = SocketListener::bind(config.daemon_socket())?;
    let listener_fd = InheritedListenerFd::new(listener.raw_fd());
    let queue = Arc::new(AdmissionQueue::new());
    let listener_handle = listener.start(Arc::new(IntakeHandler::new(Arc::clone(&queue))))?;

    let launcher = Arc::new(SystemLauncher::new(workload, listener_fd.clone()));
    let pool = Arc::new(WorkerPool::new(
        Arc::clone(&queue),
        launcher,
        config.max_workers,
    ));
    let pool_thread = pool.start();
    guard.write_health(HealthState::Ready)?;

    let shutdown = run_control_loop(&events, &sink);

    // Intake stops first on both paths; no new submissions land after this.
    listener_handle.shutdown();
    listener_handle.join()?;
    listener_fd.clear();

    match shutdown {
        ShutdownKind::Drain => {
            guard.write_health(HealthState::Draining)?;
            queue.close();
            if pool_thread.join().is_err() {
                warn!(target: PROCESS_TARGET, "pool manager thread panicked");
            }
            pool.await_idle();
            // The artefact stays until the last worker exits, so observers
            // see the daemon as bound for the whole drain.
            remove_socket_artefact(config.daemon_socket());
        }
        ShutdownKind::Kill => {
            remove_socket_artefact(config.daemon_socket());
            let abandoned = queue.clear();
            queue.close();
            // Stop the manager before signalling so no launch is in flight
            // when the outstanding set is walked.
            pool.halt();
            if pool_thread.join().is_err() {
                warn!(target: PROCESS_TARGET, "pool manager thread panicked");
            }
            if abandoned > 0 {
                info!(
                    target: PROCESS_TARGET,
                    abandoned,
                    "abandoning queued payloads"
                );
            }
            pool.terminate_outstanding();
            // Deliberately no wait: workers were signalled and the process
            // is exiting; the kernel reparents anything that lingers.
        }
    }

    guard.write_health(HealthState::Stopping)?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

fn run_control_loop(events: &Receiver<ControlEvent>, sink: &LogSink) -> ShutdownKind {
    loop {
        match events.recv() {
            Ok(ControlEvent::Rotate) => {
                if let Err(rotate_error) = sink.reopen() {
                    error!(
                        target: PROCESS_TARGET,
                        error = %rotate_error,
                        "log rotation failed"
                    );
                }
            }
            Ok(ControlEvent::Drain) => return ShutdownKind::Drain,
            Ok(ControlEvent::Kill) => return ShutdownKind::Kill,
            // A dead control source means no further signals can arrive;
            // draining is the safe interpretation.
            Err(_) => return ShutdownKind::Drain,
        }
    }
}

fn run_pre_start_hook(config: &Config) -> Result<(), LaunchError> {
    let Some(command) = &config.pre_start else {
        return Ok(());
    };
    info!(target: PROCESS_TARGET, command = %command, "running pre-start hook");
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .status()
        .map_err(|source| LaunchError::PreStart {
            command: command.clone(),
            reason: source.to_string(),
        })?;
    if !status.success() {
        return Err(LaunchError::PreStart {
            command: command.clone(),
            reason: format!("exited with status {:?}", status.code()),
        });
    }
    Ok(())
}
