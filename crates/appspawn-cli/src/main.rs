//! CLI entry point - the composition root.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use appspawn_cli::{Cli, CliError, Commands, handlers, resolve_settings};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("warning: {e:#}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

/// Log to stderr; `APPSPAWN_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("APPSPAWN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialise logging")
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = resolve_settings(&cli)?;

    match cli.command {
        Commands::Start(args) => handlers::start::execute(&settings, &args).await,
        Commands::Stop { app_root } => handlers::stop::execute(&settings, &app_root).await,
        Commands::Status { app_root } => handlers::status::execute(&settings, &app_root).await,
        Commands::Ping {
            endpoint,
            timeout_ms,
        } => {
            let timeout = timeout_ms.map_or(settings.ping_timeout(), Duration::from_millis);
            handlers::ping::execute(&endpoint, timeout).await
        }
        Commands::Spawn(args) => handlers::spawn::run(&settings, &args).await,
        Commands::StopWorker { endpoint, pid } => {
            handlers::stop_worker::execute(&settings, endpoint, pid).await
        }
    }
}
