//! The `polya` master binary: parses configuration, spawns a `polya-worker`
//! pool, and runs the race-to-first-success dispatcher against an in-memory
//! demonstration problem source until it's exhausted.

mod demo;

use anyhow::{Context, Result};
use clap::Parser;
use demo::{DemoProblemSource, DemoResultSink};
use figment::{
    error::Kind,
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use polya_master::{spawn_workers, Dispatcher, SlogInstrumentation};
use polya_util::config::{LogLevel, WorkerCount};
use polya_util::logging::Logger;
use polya_util::process::ExitCode;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io;
use std::path::PathBuf;

/// The polya master. Coordinates a pool of `polya-worker` children, racing N
/// variants of each problem to first success and cancelling the rest.
#[derive(Parser)]
#[command(version)]
#[command(after_help = "Configuration values can be specified in three ways: a config file, environment variables, or command-line options. Command-line options have the highest precedence, followed by environment variables.

The configuration value 'worker_binary' would be set via the '--worker-binary' command-line option, the POLYA_WORKER_BINARY environment variable, and the 'worker_binary' key in a configuration file.")]
struct CliOptions {
    /// Configuration file. Values here are overridden by environment
    /// variables and command-line options.
    #[arg(short = 'c', long, default_value = PathBuf::from(".config/polya.toml").into_os_string())]
    config_file: PathBuf,

    /// Number of workers in the pool. Required, directly or via config.
    #[arg(short = 'w', long)]
    workers: Option<WorkerCount>,

    /// Verbosity of log output.
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Path to the polya-worker binary. Defaults to a sibling of this executable.
    #[arg(long)]
    worker_binary: Option<PathBuf>,

    /// Number of demonstration batches to race before shutting down.
    #[arg(long, default_value_t = 3)]
    demo_batches: u32,

    /// Print the resolved configuration and exit.
    #[arg(short = 'P', long)]
    print_config: bool,
}

impl CliOptions {
    fn to_config_options(&self) -> ConfigOptions {
        ConfigOptions {
            workers: self.workers,
            log_level: self.log_level,
            worker_binary: self.worker_binary.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    workers: WorkerCount,
    #[serde(default)]
    log_level: LogLevel,
    worker_binary: Option<PathBuf>,
}

#[skip_serializing_none]
#[derive(Default, Serialize)]
struct ConfigOptions {
    workers: Option<WorkerCount>,
    log_level: Option<LogLevel>,
    worker_binary: Option<PathBuf>,
}

fn default_worker_binary() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating current executable")?;
    let dir = exe.parent().context("executable has no parent directory")?;
    Ok(dir.join("polya-worker"))
}

fn main() -> Result<ExitCode> {
    let cli_options = CliOptions::parse();
    let print_config = cli_options.print_config;
    let config: Config = Figment::new()
        .merge(Serialized::defaults(ConfigOptions::default()))
        .merge(Toml::file(&cli_options.config_file))
        .merge(Env::prefixed("POLYA_"))
        .merge(Serialized::globals(cli_options.to_config_options()))
        .extract()
        .map_err(|mut e| {
            if let Kind::MissingField(field) = &e.kind {
                e.kind = Kind::Message(format!("configuration value \"{field}\" was not provided"));
                e
            } else {
                e
            }
        })
        .context("reading configuration")?;

    if print_config {
        println!("{config:#?}");
        return Ok(ExitCode::SUCCESS);
    }

    let log = Logger::DefaultLogger(config.log_level).build(io::stderr());
    let worker_binary = match config.worker_binary {
        Some(path) => path,
        None => default_worker_binary()?,
    };

    let (table, control) =
        spawn_workers(config.workers.get(), &worker_binary).context("spawning worker pool")?;
    let problems = DemoProblemSource::new(cli_options.demo_batches);
    let sink = DemoResultSink { log: log.clone() };
    let instrumentation = SlogInstrumentation { log };

    let mut dispatcher = Dispatcher::new(table, control, problems, sink, instrumentation);
    match dispatcher.run() {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("polya: {err:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[test]
fn test_cli() {
    use clap::CommandFactory;
    CliOptions::command().debug_assert()
}
