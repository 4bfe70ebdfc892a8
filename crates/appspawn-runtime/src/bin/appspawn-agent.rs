//! `appspawn-agent`: the out-of-process half of appspawn.
//!
//! Started by supervisors and spawners, never by hand. Stdout carries
//! exactly one handshake line; logs go to stderr, filtered by
//! `APPSPAWN_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use appspawn_core::{Endpoint, Transport};
use appspawn_runtime::agent::{PreloaderConfig, run_preloader, run_worker};

/// Grace period for blocking stdin readers when the runtime shuts down.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "appspawn-agent")]
#[command(about = "Application agent started by appspawn", long_about = None)]
struct AgentCli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Load the application once and start warm workers on request
    Preloader {
        /// Endpoint to listen on
        #[arg(long)]
        endpoint: Endpoint,

        /// Directory for worker sockets
        #[arg(long)]
        sockets_dir: PathBuf,

        /// Transport for worker endpoints
        #[arg(long, default_value = "unix")]
        transport: Transport,

        /// Deadline for one worker's handshake, in milliseconds
        #[arg(long, default_value_t = 25_000)]
        spawn_timeout_ms: u64,

        /// Deadline for verifying pings, in milliseconds
        #[arg(long, default_value_t = 2_000)]
        ping_timeout_ms: u64,
    },
    /// Run the application and serve its control channel
    Worker {
        /// Endpoint to listen on
        #[arg(long)]
        endpoint: Endpoint,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("APPSPAWN_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = AgentCli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async move {
        match cli.role {
            Role::Preloader {
                endpoint,
                sockets_dir,
                transport,
                spawn_timeout_ms,
                ping_timeout_ms,
            } => {
                run_preloader(PreloaderConfig {
                    endpoint,
                    sockets_dir,
                    transport,
                    spawn_timeout: Duration::from_millis(spawn_timeout_ms),
                    ping_timeout: Duration::from_millis(ping_timeout_ms),
                })
                .await
            }
            Role::Worker { endpoint } => run_worker(endpoint).await,
        }
    });

    // A worker may still be blocked reading its owner pipe.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
