//! Binary entrypoint for the `gafferd` job-dispatch daemon.
//!
//! Flag parsing lives here; everything after [`gafferd::run_daemon`] is
//! library code so tests can drive the daemon without a process boundary.

use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;

use gaffer_config::{Config, LogFormat, SocketEndpoint};
use gafferd::{CommandWorkload, LaunchMode, run_daemon};

/// Command-line interface for the gaffer job-dispatch daemon.
#[derive(Parser, Debug)]
#[command(name = "gafferd", version, disable_help_subcommand = true)]
struct Cli {
    /// Socket endpoint to bind (`unix://` URL or bare path).
    #[arg(long, short = 's')]
    socket: Option<SocketEndpoint>,
    /// Shell command run for each job with the payload on stdin.
    #[arg(long, short = 'c', value_name = "COMMAND")]
    command: String,
    /// Maximum number of concurrently running workers.
    #[arg(long, short = 'j')]
    max_workers: Option<usize>,
    /// Log destination; stderr when omitted.
    #[arg(long, value_name = "PATH")]
    log: Option<Utf8PathBuf>,
    /// Tracing filter expression (for example `info,gafferd::pool=debug`).
    #[arg(long, value_name = "FILTER")]
    log_filter: Option<String>,
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Json)]
    log_format: LogFormatArg,
    /// User to assume before binding the socket.
    #[arg(long, value_name = "USER")]
    user: Option<String>,
    /// Group to assume before binding the socket.
    #[arg(long, value_name = "GROUP")]
    group: Option<String>,
    /// Shell command executed once before the listener binds.
    #[arg(long, value_name = "COMMAND")]
    pre_start: Option<String>,
    /// Stay attached to the terminal instead of daemonising.
    #[arg(long)]
    foreground: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogFormatArg {
    Json,
    Compact,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Compact => Self::Compact,
        }
    }
}

impl Cli {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            socket: self.socket.unwrap_or(defaults.socket),
            max_workers: self.max_workers.unwrap_or(defaults.max_workers),
            log_path: self.log,
            log_filter: self.log_filter.unwrap_or(defaults.log_filter),
            log_format: self.log_format.into(),
            run_as_user: self.user,
            run_as_group: self.group,
            worker_command: Some(self.command),
            pre_start: self.pre_start,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mode = if cli.foreground {
        LaunchMode::Foreground
    } else {
        LaunchMode::detect()
    };
    let workload = Arc::new(CommandWorkload::new(cli.command.clone()));
    let config = cli.into_config();
    match run_daemon(config, workload, mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(launch_error) => {
            eprintln!("gafferd: {launch_error}");
            ExitCode::FAILURE
        }
    }
}
