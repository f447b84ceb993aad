//! fizzgate - FizzBuzz over HTTP
//!
//! Usage:
//!     SERVER_PORT=8080 ADMIN_PORT=8081 fizzgate
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use fizzgate::AppState;
use fizzgate::config::{LogFormat, Settings, load_from_env};
use fizzgate::lifecycle::{OsSignals, SignalListener};
use fizzgate::util::init_logging;

/// A FizzBuzz HTTP API with health checks, metrics and graceful shutdown.
#[derive(Parser, Debug)]
#[command(name = "fizzgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, value_name = "LEVEL", env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Print the effective configuration and exit
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format);

    // Addresses are validated before anything is started.
    let settings = match load_from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        return match serde_yaml::to_string(&settings) {
            Ok(yaml) => {
                print!("{}", yaml);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "failed to render configuration");
                ExitCode::FAILURE
            }
        };
    }

    info!(
        api = %settings.api_address,
        admin = %settings.admin_address,
        shutdown_timeout = ?settings.shutdown_timeout,
        auth = settings.auth_enabled(),
        "fizzgate starting"
    );

    match run(settings) {
        Ok(()) => {
            info!("fizzgate shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "fizzgate shut down with errors");
            ExitCode::FAILURE
        }
    }
}

/// Build the runtime and run until every server has stopped.
fn run(settings: Settings) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run_async(settings))
}

async fn run_async(settings: Settings) -> Result<()> {
    let state = AppState::new(settings);

    let signals = OsSignals::install().context("failed to install signal handlers")?;
    let listener = SignalListener::new(
        state.signal().clone(),
        Arc::clone(state.terminations()),
        signals,
    );
    tokio::spawn(listener.run());

    let coordinator = state.coordinator(state.admin_server(), state.api_server());
    coordinator.run().await.context("server lifecycle failed")?;
    Ok(())
}
