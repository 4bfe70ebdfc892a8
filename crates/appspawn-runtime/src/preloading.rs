//! Smart spawning: one preloading backend, many warm workers.
//!
//! The backend is an [`AbstractServer`] running `appspawn-agent
//! preloader`. It loads the application once; every spawn request then
//! starts a worker from that warm state without repeating the load.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use appspawn_core::protocol::{ControlRequest, ControlResponse, FailureKind, encode_frame};
use appspawn_core::{
    AgentRole, Diagnostics, Endpoint, OptionsError, ProcessHandle, ProtocolError, ServerError,
    Settings, SpawnError, SpawnOptions, Spawner, SpawnerError, StartError, StatusReport, Transport,
    ensure_preloaded, pids_dir, run_root, server_key, sockets_dir,
};

use crate::channel::{ChannelError, ControlChannel};
use crate::error::SetupError;
use crate::handshake::EXIT_WAIT;
use crate::launch::{agent_command, resolve_agent_path, resolve_run_as};
use crate::pidfile::{is_agent_process, is_live_process};
use crate::process::kill_pid;
use crate::server::{AbstractServer, Liveness, ServerConfig, ServerProgram};

/// Time the backend may need past a worker's deadline to reap it and
/// report its diagnostics.
const REPLY_MARGIN: Duration = EXIT_WAIT.saturating_add(Duration::from_secs(1));

/// How long to wait for the backend's answer to a spawn request.
pub fn spawn_reply_deadline(spawn_timeout: Duration, ping_timeout: Duration) -> Duration {
    spawn_timeout + ping_timeout + REPLY_MARGIN
}

/// Files and endpoint of the backend for one application root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendLocation {
    pub pidfile: PathBuf,
    pub endpoint: Endpoint,
    pub log_file: PathBuf,
    /// Directory for worker sockets.
    pub sockets_dir: PathBuf,
}

impl BackendLocation {
    /// Locate the backend of `app_root` under the run directory.
    pub fn for_app(app_root: &Path, settings: &Settings) -> Result<Self, SetupError> {
        let root = run_root(settings)?;
        let key = server_key(app_root)?;
        let sockets = sockets_dir(&root)?;
        let pids = pids_dir(&root)?;

        let endpoint = match settings.transport() {
            Transport::Unix => Endpoint::Unix(sockets.join(format!("backend-{key}.sock"))),
            Transport::Tcp => Endpoint::loopback_unbound(),
        };

        Ok(Self {
            pidfile: pids.join(format!("{key}.pid")),
            endpoint,
            log_file: pids.join(format!("{key}.log")),
            sockets_dir: sockets,
        })
    }
}

/// Runs `appspawn-agent preloader`.
struct PreloaderProgram {
    agent: PathBuf,
    options: SpawnOptions,
    sockets_dir: PathBuf,
    transport: Transport,
    spawn_timeout: Duration,
    ping_timeout: Duration,
}

impl ServerProgram for PreloaderProgram {
    fn name(&self) -> &str {
        "preloader"
    }

    fn command(&self, endpoint: &Endpoint) -> Result<Command, StartError> {
        let run_as = resolve_run_as(self.options.user.as_deref())
            .map_err(|e| StartError::new(e.to_string()))?;

        let mut cmd = agent_command(&self.agent, AgentRole::Preloader, endpoint);
        cmd.arg("--sockets-dir")
            .arg(&self.sockets_dir)
            .arg("--transport")
            .arg(self.transport.to_string())
            .arg("--spawn-timeout-ms")
            .arg(self.spawn_timeout.as_millis().to_string())
            .arg("--ping-timeout-ms")
            .arg(self.ping_timeout.as_millis().to_string());
        if let Some(run_as) = run_as {
            run_as.apply(&mut cmd);
        }
        Ok(cmd)
    }

    fn boot_frame(&self) -> Result<String, StartError> {
        encode_frame(&self.options).map_err(|e| StartError::new(e.to_string()))
    }
}

/// Spawner backed by a preloading backend.
pub struct PreloadingSpawnServer {
    server: AbstractServer,
    agent: PathBuf,
    app_root: PathBuf,
    startup_file: PathBuf,
    environment: String,
    spawn_timeout: Duration,
    ping_timeout: Duration,
    stop_grace: Duration,
    workers: Mutex<Vec<ProcessHandle>>,
}

impl PreloadingSpawnServer {
    /// Backend for the application in `options`, with stderr captured in memory.
    pub fn new(options: SpawnOptions, settings: &Settings) -> Result<Self, SetupError> {
        Self::build(options, settings, false)
    }

    /// Backend whose stderr goes to a log file, for backends that outlive
    /// this process (see [`PreloadingSpawnServer::detach`]).
    pub fn with_log_file(options: SpawnOptions, settings: &Settings) -> Result<Self, SetupError> {
        Self::build(options, settings, true)
    }

    fn build(options: SpawnOptions, settings: &Settings, log_to_file: bool) -> Result<Self, SetupError> {
        options.validate()?;
        let app_root = options
            .app_root
            .canonicalize()
            .map_err(|e| OptionsError::Unreadable {
                path: options.app_root.clone(),
                reason: e.to_string(),
            })?;
        let agent = resolve_agent_path(settings)?;
        let location = BackendLocation::for_app(&app_root, settings)?;

        let mut config = ServerConfig::from_settings(location.endpoint, settings)
            .with_pidfile(location.pidfile);
        if log_to_file {
            config = config.with_log_file(location.log_file);
        }

        let startup_file = options.startup_file().to_path_buf();
        let environment = options.environment.clone();
        let program = PreloaderProgram {
            agent: agent.clone(),
            options,
            sockets_dir: location.sockets_dir,
            transport: settings.transport(),
            spawn_timeout: settings.spawn_timeout(),
            ping_timeout: settings.ping_timeout(),
        };

        Ok(Self {
            server: AbstractServer::new(program, config),
            agent,
            app_root,
            startup_file,
            environment,
            spawn_timeout: settings.spawn_timeout(),
            ping_timeout: settings.ping_timeout(),
            stop_grace: settings.stop_grace(),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// The supervised backend.
    pub const fn server(&self) -> &AbstractServer {
        &self.server
    }

    /// Canonical root of the preloaded application.
    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    /// Start the backend; the application is loaded exactly once here.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.server.start().await
    }

    /// Stop the backend. Workers it produced keep running.
    pub async fn stop(&self) -> Result<(), ServerError> {
        self.server.stop().await
    }

    pub async fn restart(&self) -> Result<(), ServerError> {
        self.server.restart().await
    }

    pub async fn ping(&self) -> Result<bool, ServerError> {
        self.server.ping().await
    }

    pub fn is_started(&self) -> bool {
        self.server.is_started()
    }

    pub async fn status(&self) -> Result<StatusReport, ServerError> {
        self.server.status().await
    }

    /// Leave the backend running after this value is dropped.
    pub async fn detach(&self) -> Option<u32> {
        self.server.detach().await
    }

    /// Handles of the workers spawned so far.
    pub fn workers(&self) -> Vec<ProcessHandle> {
        self.workers
            .lock()
            .map(|workers| workers.clone())
            .unwrap_or_default()
    }

    /// Kill every worker this server produced that is still alive.
    ///
    /// Returns how many were killed.
    pub async fn reclaim_workers(&self) -> usize {
        let workers = self
            .workers
            .lock()
            .map(|mut workers| std::mem::take(&mut *workers))
            .unwrap_or_default();

        let mut reclaimed = 0;
        for handle in workers {
            if !is_live_process(handle.pid) {
                continue;
            }
            if !is_agent_process(handle.pid, &self.agent) {
                warn!(pid = handle.pid, "Worker PID now belongs to another process, skipping");
                continue;
            }
            match kill_pid(handle.pid, self.stop_grace).await {
                Ok(()) => {
                    debug!(pid = handle.pid, "Reclaimed worker");
                    reclaimed += 1;
                }
                Err(e) => warn!(pid = handle.pid, error = %e, "Failed to reclaim worker"),
            }
        }
        reclaimed
    }

    async fn backend_channel(&self) -> Result<ControlChannel, SpawnerError> {
        match self.server.liveness().await {
            Liveness::Alive { channel, .. } => Ok(channel),
            Liveness::NotStarted => Err(SpawnerError::BackendUnavailable(
                "backend is not running".to_string(),
            )),
            Liveness::Exited { pid, status } => Err(SpawnerError::BackendUnavailable(format!(
                "backend (PID {pid}) exited: {status}"
            ))),
        }
    }

    /// Classify a failed exchange: a dead backend is unavailable, a live
    /// one just failed this spawn.
    async fn transport_failure(&self, err: ChannelError) -> SpawnerError {
        match self.backend_channel().await {
            Ok(_) => SpawnError::new(format!("spawn request failed: {err}")).into(),
            Err(unavailable) => unavailable,
        }
    }

    fn record(&self, handle: &ProcessHandle) {
        if let Ok(mut workers) = self.workers.lock() {
            workers.retain(|w| is_live_process(w.pid));
            workers.push(handle.clone());
        }
    }
}

#[async_trait]
impl Spawner for PreloadingSpawnServer {
    async fn spawn_application(
        &self,
        options: &SpawnOptions,
    ) -> Result<ProcessHandle, SpawnerError> {
        options.validate()?;
        ensure_preloaded(&self.app_root, &self.startup_file, &self.environment, options)?;

        let channel = self.backend_channel().await?;
        let request = ControlRequest::Spawn {
            options: options.clone(),
        };
        let response = channel
            .with_timeout(spawn_reply_deadline(self.spawn_timeout, self.ping_timeout))
            .request(&request)
            .await;

        let handle = match response {
            Ok(ControlResponse::Spawned { handle }) => handle,
            Ok(ControlResponse::Failed {
                kind: FailureKind::Spawn | FailureKind::InvalidOptions,
                message,
                app_output,
            }) => {
                let mut diagnostics = Diagnostics::default();
                diagnostics.app_output = app_output;
                return Err(SpawnError::new(message).with_diagnostics(diagnostics).into());
            }
            Ok(other) => {
                return Err(ProtocolError::UnexpectedResponse {
                    expected: "spawned",
                    got: other.name().to_string(),
                }
                .into());
            }
            Err(ChannelError::Protocol(e)) => return Err(e.into()),
            Err(e) => return Err(self.transport_failure(e).await),
        };

        if &handle.endpoint == channel.endpoint() {
            return Err(ProtocolError::UnexpectedResponse {
                expected: "a worker endpoint",
                got: format!("the backend's own endpoint {}", handle.endpoint),
            }
            .into());
        }
        ControlChannel::new(handle.endpoint.clone(), self.ping_timeout)
            .ping_pid(handle.pid)
            .await
            .map_err(|e| SpawnError::new(format!("spawned worker is not answering: {e}")))?;

        info!(pid = handle.pid, endpoint = %handle.endpoint, "Spawned warm worker");
        self.record(&handle);
        Ok(handle)
    }
}
