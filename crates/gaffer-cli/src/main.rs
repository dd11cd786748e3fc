//! Command-line client for the gaffer job-dispatch daemon.

use std::io::{self, Read};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use gaffer_cli::{BootstrapOptions, Client, StopKind, daemon_status, stop_daemon};
use gaffer_config::{Config, SocketEndpoint};

/// Command-line interface for the gaffer client.
#[derive(Parser, Debug)]
#[command(name = "gaffer", version, disable_help_subcommand = true)]
struct Cli {
    /// Socket endpoint of the daemon (`unix://` URL or bare path).
    #[arg(long, short = 's', global = true)]
    socket: Option<SocketEndpoint>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Submits a job payload read from stdin or a file.
    Submit {
        /// File holding the payload; stdin is read when omitted.
        #[arg(long, value_name = "FILE")]
        input: Option<Utf8PathBuf>,
        /// Shell command a bootstrapped daemon runs for each job.
        ///
        /// Required for lazy bootstrap; without it, submission fails when
        /// no daemon is listening.
        #[arg(long, short = 'c', value_name = "COMMAND")]
        command: Option<String>,
        /// Concurrency ceiling forwarded to a bootstrapped daemon.
        #[arg(long, short = 'j')]
        max_workers: Option<usize>,
        /// Log destination forwarded to a bootstrapped daemon.
        #[arg(long, value_name = "PATH")]
        log: Option<Utf8PathBuf>,
    },
    /// Stops the daemon, draining queued work first.
    Stop {
        /// Abandon queued work and exit promptly instead of draining.
        #[arg(long)]
        kill: bool,
    },
    /// Prints daemon health information.
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config {
        socket: cli.socket.unwrap_or_else(|| Config::default().socket),
        ..Config::default()
    };
    let outcome = match cli.command {
        CliCommand::Submit {
            input,
            command,
            max_workers,
            log,
        } => run_submit(&config, input, command, max_workers, log),
        CliCommand::Stop { kill } => run_stop(&config, kill),
        CliCommand::Status => run_status(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("gaffer: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run_submit(
    config: &Config,
    input: Option<Utf8PathBuf>,
    command: Option<String>,
    max_workers: Option<usize>,
    log: Option<Utf8PathBuf>,
) -> Result<(), String> {
    let payload = match input {
        Some(path) => std::fs::read(path.as_std_path())
            .map_err(|error| format!("failed to read payload from '{path}': {error}"))?,
        None => read_stdin()?,
    };
    let client = Client::new(config.daemon_socket().clone());
    match command {
        Some(worker_command) => {
            let mut options = BootstrapOptions::new(worker_command);
            options.max_workers = max_workers;
            options.log_path = log;
            client
                .deliver(&payload, config, &options)
                .map_err(|error| error.to_string())
        }
        None => client.submit(&payload).map_err(|error| error.to_string()),
    }
}

fn run_stop(config: &Config, kill: bool) -> Result<(), String> {
    let kind = if kill { StopKind::Kill } else { StopKind::Drain };
    let pid = stop_daemon(config, kind).map_err(|error| error.to_string())?;
    println!("daemon (pid {pid}) stopped");
    Ok(())
}

fn run_status(config: &Config) -> Result<(), String> {
    let report = daemon_status(config).map_err(|error| error.to_string())?;
    match (&report.snapshot, report.socket_reachable) {
        (Some(snapshot), true) => {
            println!(
                "daemon {} (pid {}) on {}",
                snapshot.status,
                snapshot.pid,
                config.daemon_socket()
            );
        }
        (Some(snapshot), false) => {
            println!(
                "daemon not answering on {} (last status: {})",
                config.daemon_socket(),
                snapshot.status
            );
        }
        (None, true) => {
            println!(
                "something is listening on {} but no health snapshot exists",
                config.daemon_socket()
            );
        }
        (None, false) => {
            println!("no daemon on {}", config.daemon_socket());
        }
    }
    Ok(())
}

fn read_stdin() -> Result<Vec<u8>, String> {
    let mut payload = Vec::new();
    io::stdin()
        .read_to_end(&mut payload)
        .map_err(|error| format!("failed to read payload from stdin: {error}"))?;
    Ok(payload)
}
