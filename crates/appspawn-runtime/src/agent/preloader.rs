//! Preloader role: hold the loaded application, start warm workers.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use appspawn_core::protocol::{ControlRequest, ControlResponse, FailureKind, encode_frame};
use appspawn_core::{
    AgentRole, BootKind, Diagnostics, Endpoint, PreloadState, ProcessHandle,
    SpawnMethod, SpawnOptions, StartError, StatusReport, Transport, WorkerBoot,
};

use super::listener::ControlHandler;
use super::{
    AgentError, bind_or_report, cancel_on_signals, load_application, read_boot, report_failure,
    report_ready, stdin_reader,
};
use crate::handshake::{BootSpec, StderrTarget, launch, reap_in_background};
use crate::launch::{agent_command, allocate_endpoint, resolve_run_as};

/// Command-line configuration of a preloader.
#[derive(Debug, Clone)]
pub struct PreloaderConfig {
    pub endpoint: Endpoint,
    /// Where worker sockets are created.
    pub sockets_dir: PathBuf,
    /// Transport for worker endpoints.
    pub transport: Transport,
    /// Deadline for one worker's handshake.
    pub spawn_timeout: Duration,
    pub ping_timeout: Duration,
}

struct PreloaderService {
    state: PreloadState,
    agent: PathBuf,
    config: PreloaderConfig,
    /// Held around process creation only.
    launch_lock: Mutex<()>,
    spawned: AtomicU64,
    started: Instant,
    shutdown: CancellationToken,
}

/// Run the preloader until it is told to shut down.
pub async fn run_preloader(config: PreloaderConfig) -> Result<(), AgentError> {
    let options: SpawnOptions = read_boot(&mut stdin_reader()).await?;

    let state = match load_application(&options).await {
        Ok(state) => state,
        Err(failure) => {
            return Err(report_failure(AgentError::Load(failure.message), failure.app_output).await);
        }
    };
    let agent = std::env::current_exe()?;

    let listener = bind_or_report(&config.endpoint).await?;
    let shutdown = CancellationToken::new();
    cancel_on_signals(shutdown.clone());
    let endpoint = report_ready(&listener).await?;
    info!(pid = std::process::id(), %endpoint, app_root = %state.app_root.display(), "Preloader ready");

    let service = Arc::new(PreloaderService {
        state,
        agent,
        config,
        launch_lock: Mutex::new(()),
        spawned: AtomicU64::new(0),
        started: Instant::now(),
        shutdown: shutdown.clone(),
    });
    listener.serve(service, shutdown).await;

    info!("Preloader exiting");
    Ok(())
}

impl PreloaderService {
    async fn spawn_worker(&self, options: SpawnOptions) -> ControlResponse {
        if let Err(e) = options.validate() {
            return ControlResponse::failed(FailureKind::InvalidOptions, e.to_string());
        }
        if let Err(e) = self.state.accepts(&options) {
            return ControlResponse::failed(FailureKind::InvalidOptions, e.to_string());
        }
        let run_as = match resolve_run_as(options.user.as_deref()) {
            Ok(run_as) => run_as,
            Err(e) => return ControlResponse::failed(FailureKind::InvalidOptions, e.to_string()),
        };

        let endpoint = allocate_endpoint(self.config.transport, &self.config.sockets_dir, "worker");
        let mut cmd = agent_command(&self.agent, AgentRole::Worker, &endpoint);
        cmd.envs(self.state.worker_environment(&options));
        if let Some(run_as) = run_as {
            run_as.apply(&mut cmd);
        }

        let boot = WorkerBoot::Warm {
            state: self.state.clone(),
            options,
        };
        let frame = match encode_frame(&boot) {
            Ok(frame) => frame,
            Err(e) => return ControlResponse::failed(FailureKind::Spawn, e.to_string()),
        };

        let launched = {
            let _guard = self.launch_lock.lock().await;
            launch(cmd, &StderrTarget::Capture)
        };
        let launched = match launched {
            Ok(launched) => launched,
            Err(e) => return spawn_failure(e),
        };
        debug!(pid = launched.pid(), %endpoint, "Worker launched");

        let spec = BootSpec {
            endpoint,
            timeout: self.config.spawn_timeout,
            ping_timeout: self.config.ping_timeout,
            keep_stdin: false,
        };
        match launched.handshake(&frame, &spec).await {
            Ok(booted) => {
                let handle =
                    ProcessHandle::new(booted.pid, booted.endpoint.clone(), SpawnMethod::Smart);
                self.spawned.fetch_add(1, Ordering::SeqCst);
                info!(pid = handle.pid, endpoint = %handle.endpoint, "Worker spawned");
                reap_in_background(booted.child, booted.pid, booted.endpoint);
                ControlResponse::Spawned { handle }
            }
            Err(e) => {
                warn!(error = %e.message, "Worker failed to start");
                spawn_failure(e)
            }
        }
    }

    fn report(&self) -> StatusReport {
        StatusReport {
            pid: std::process::id(),
            role: AgentRole::Preloader,
            boot: BootKind::Cold,
            app_root: self.state.app_root.clone(),
            environment: self.state.environment.clone(),
            loaded_at: self.state.loaded_at,
            uptime_secs: self.started.elapsed().as_secs(),
            workers_spawned: Some(self.spawned.load(Ordering::SeqCst)),
            app_env: Default::default(),
        }
    }
}

/// Failure reply keeping the application output apart from the rest.
fn spawn_failure(err: StartError) -> ControlResponse {
    let StartError {
        mut message,
        diagnostics,
    } = err;
    let rest = Diagnostics {
        app_output: None,
        ..diagnostics.clone()
    };
    if !rest.is_empty() {
        message = format!("{message}\n{rest}");
    }
    ControlResponse::Failed {
        kind: FailureKind::Spawn,
        message,
        app_output: diagnostics.app_output,
    }
}

#[async_trait]
impl ControlHandler for PreloaderService {
    async fn handle(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Ping => ControlResponse::Pong {
                pid: std::process::id(),
            },
            ControlRequest::Spawn { options } => self.spawn_worker(options).await,
            ControlRequest::Status => ControlResponse::Status {
                report: self.report(),
            },
            ControlRequest::Shutdown => {
                info!("Shutdown requested");
                self.shutdown.cancel();
                ControlResponse::ShuttingDown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failure_separates_app_output() {
        let err = StartError::new("worker exited").with_diagnostics(
            Diagnostics::default()
                .with_app_output("trace\n")
                .with_exit_status(1),
        );
        let ControlResponse::Failed {
            kind,
            message,
            app_output,
        } = spawn_failure(err)
        else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::Spawn);
        assert!(message.starts_with("worker exited\n"));
        assert!(!message.contains("trace"));
        assert_eq!(app_output.as_deref(), Some("trace\n"));
    }
}
