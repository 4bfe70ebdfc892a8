//! Worker role: the application process itself.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use appspawn_core::protocol::{ControlRequest, ControlResponse, FailureKind};
use appspawn_core::{
    AgentRole, BootKind, Endpoint, PreloadState, SpawnOptions, StatusReport, WorkerBoot,
};

use super::listener::ControlHandler;
use super::{
    AgentError, StdinReader, bind_or_report, cancel_on_signals, load_application, read_boot,
    report_failure, report_ready, stdin_reader,
};

struct WorkerService {
    state: PreloadState,
    options: SpawnOptions,
    boot: BootKind,
    started: Instant,
    shutdown: CancellationToken,
}

/// Run a worker until it is told to shut down or its owner goes away.
pub async fn run_worker(endpoint: Endpoint) -> Result<(), AgentError> {
    let mut stdin = stdin_reader();
    let boot: WorkerBoot = read_boot(&mut stdin).await?;
    let watch_owner = boot.watches_owner_pipe();

    let (state, options, kind) = match boot {
        WorkerBoot::Warm { state, options } => (state, options, BootKind::Warm),
        WorkerBoot::Cold { options } => match load_application(&options).await {
            Ok(state) => (state, options, BootKind::Cold),
            Err(failure) => {
                return Err(
                    report_failure(AgentError::Load(failure.message), failure.app_output).await,
                );
            }
        },
    };

    let listener = bind_or_report(&endpoint).await?;
    let shutdown = CancellationToken::new();
    cancel_on_signals(shutdown.clone());
    if watch_owner {
        watch_owner_pipe(stdin, shutdown.clone());
    }
    let endpoint = report_ready(&listener).await?;
    info!(pid = std::process::id(), %endpoint, boot = ?kind, "Worker ready");

    let service = Arc::new(WorkerService {
        state,
        options,
        boot: kind,
        started: Instant::now(),
        shutdown: shutdown.clone(),
    });
    listener.serve(service, shutdown).await;

    info!("Worker exiting");
    Ok(())
}

/// Shut down once the owner closes our stdin.
fn watch_owner_pipe(mut stdin: StdinReader, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => debug!("Ignoring input on owner pipe"),
            }
        }
        info!("Owner pipe closed, shutting down");
        shutdown.cancel();
    });
}

#[async_trait]
impl ControlHandler for WorkerService {
    async fn handle(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Ping => ControlResponse::Pong {
                pid: std::process::id(),
            },
            ControlRequest::Status => ControlResponse::Status {
                report: StatusReport {
                    pid: std::process::id(),
                    role: AgentRole::Worker,
                    boot: self.boot,
                    app_root: self.state.app_root.clone(),
                    environment: self.state.environment.clone(),
                    loaded_at: self.state.loaded_at,
                    uptime_secs: self.started.elapsed().as_secs(),
                    workers_spawned: None,
                    app_env: self.state.worker_environment(&self.options),
                },
            },
            ControlRequest::Shutdown => {
                info!("Shutdown requested");
                self.shutdown.cancel();
                ControlResponse::ShuttingDown
            }
            ControlRequest::Spawn { .. } => {
                ControlResponse::failed(FailureKind::Unsupported, "workers do not spawn workers")
            }
        }
    }
}
