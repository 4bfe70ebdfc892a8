//! Supervisor for one out-of-process agent server.
//!
//! `AbstractServer` owns the lifecycle state internally behind a
//! `tokio::sync::Mutex`; what it runs is supplied by a [`ServerProgram`].
//!
//! Key design decisions:
//! - **Handshake before ready**: `start` returns only after the child
//!   reported its endpoint and answered a ping with its own PID
//! - **Pid file + endpoint ping**: a second supervisor for the same
//!   server detects the first one instead of starting a duplicate
//! - **Graceful then forceful**: `stop` asks over the control channel,
//!   waits the grace period, then escalates SIGTERM → SIGKILL
//! - **Crash detection**: `liveness` reaps an exited child and moves the
//!   state to crashed so callers can report the backend as unavailable

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use appspawn_core::{
    AlreadyRunning, Endpoint, ProcessState, ServerError, Settings, StartError, StatusReport,
    SupervisedServer,
};

use crate::channel::{ChannelError, ControlChannel};
use crate::handshake::{BootSpec, StderrTarget, launch};
use crate::pidfile::{
    ServerRecord, delete_pidfile, is_agent_process, is_live_process, read_pidfile, write_pidfile,
};
use crate::process::{kill_pid, shutdown_child, wait_for_exit};

/// What a supervised server runs.
pub trait ServerProgram: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Command that starts the server listening on `endpoint`.
    fn command(&self, endpoint: &Endpoint) -> Result<Command, StartError>;

    /// First frame written to the server's stdin.
    fn boot_frame(&self) -> Result<String, StartError>;
}

/// Where and how a server is supervised.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Endpoint the server is asked to listen on.
    pub endpoint: Endpoint,
    /// Pid file recording the running server, if any.
    pub pidfile: Option<PathBuf>,
    /// Log file for the server's stderr. Captured in memory when unset.
    pub log_file: Option<PathBuf>,
    pub start_timeout: Duration,
    pub stop_grace: Duration,
    pub ping_timeout: Duration,
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Config for `endpoint` with timeouts taken from `settings`.
    pub fn from_settings(endpoint: Endpoint, settings: &Settings) -> Self {
        Self {
            endpoint,
            pidfile: None,
            log_file: None,
            start_timeout: settings.start_timeout(),
            stop_grace: settings.stop_grace(),
            ping_timeout: settings.ping_timeout(),
            request_timeout: settings.request_timeout(),
        }
    }

    #[must_use]
    pub fn with_pidfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.pidfile = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// Handle to a running server.
struct RunningServer {
    child: Child,
    pid: u32,
    channel: ControlChannel,
}

enum Lifecycle {
    Idle,
    Running(RunningServer),
    Stopped,
    Crashed { pid: u32, status: String },
}

/// Observed state of the server.
#[derive(Debug, Clone)]
pub enum Liveness {
    /// Never started, stopped, or detached.
    NotStarted,
    /// The child is running; `channel` reaches it.
    Alive { pid: u32, channel: ControlChannel },
    /// The child exited without being asked to.
    Exited { pid: u32, status: String },
}

/// Result of stopping a server recorded by another supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedStop {
    /// No pid file, or the recorded process was already gone.
    NotRunning,
    /// The recorded server was stopped.
    Stopped(u32),
    /// The recorded PID belongs to something else; only the pid file was removed.
    Stale(u32),
}

/// Supervises one agent process.
///
/// # Example
///
/// ```ignore
/// let server = AbstractServer::new(program, ServerConfig::from_settings(endpoint, &settings));
/// server.start().await?;
/// assert!(server.ping().await?);
/// server.stop().await?;
/// ```
pub struct AbstractServer {
    program: Box<dyn ServerProgram>,
    config: ServerConfig,
    lifecycle: Mutex<Lifecycle>,
    started: AtomicBool,
    attempted: AtomicBool,
}

impl AbstractServer {
    pub fn new(program: impl ServerProgram + 'static, config: ServerConfig) -> Self {
        Self {
            program: Box::new(program),
            config,
            lifecycle: Mutex::new(Lifecycle::Idle),
            started: AtomicBool::new(false),
            attempted: AtomicBool::new(false),
        }
    }

    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start the server and wait until it proves readiness.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] if this supervisor or another one
    ///   already runs the server
    /// - [`ServerError::Start`] if the child failed to become ready; the
    ///   child is killed and its diagnostics attached
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut state = self.lifecycle.lock().await;
        self.attempted.store(true, Ordering::SeqCst);

        if let Lifecycle::Running(running) = &mut *state {
            match running.child.try_wait()? {
                None => return Err(ServerError::AlreadyStarted(AlreadyRunning::Pid(running.pid))),
                Some(status) => {
                    warn!(server = self.program.name(), pid = running.pid, %status, "Previous server exited unexpectedly");
                }
            }
        }
        *state = Lifecycle::Idle;
        self.started.store(false, Ordering::SeqCst);

        if let Some(existing) = Self::find_existing(
            self.config.pidfile.as_deref(),
            &self.config.endpoint,
            self.config.ping_timeout,
        )
        .await
        {
            return Err(ServerError::AlreadyStarted(existing));
        }

        // Leftovers of a crashed predecessor.
        self.release_files();

        let running = self.boot().await?;
        info!(
            server = self.program.name(),
            pid = running.pid,
            endpoint = %running.channel.endpoint(),
            "Server started"
        );
        *state = Lifecycle::Running(running);
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn boot(&self) -> Result<RunningServer, ServerError> {
        let endpoint = &self.config.endpoint;
        let cmd = self.program.command(endpoint)?;
        let frame = self.program.boot_frame()?;
        let stderr = self
            .config
            .log_file
            .clone()
            .map_or(StderrTarget::Capture, StderrTarget::File);

        debug!(server = self.program.name(), %endpoint, "Starting server");
        let launched = launch(cmd, &stderr)?;
        let spec = BootSpec {
            endpoint: endpoint.clone(),
            timeout: self.config.start_timeout,
            ping_timeout: self.config.ping_timeout,
            keep_stdin: false,
        };
        let booted = match launched.handshake(&frame, &spec).await {
            Ok(booted) => booted,
            Err(err) => {
                self.release_files();
                return Err(err.into());
            }
        };

        let mut child = booted.child;
        if let Some(path) = &self.config.pidfile {
            let record = ServerRecord {
                pid: booted.pid,
                endpoint: booted.endpoint.clone(),
            };
            if let Err(e) = write_pidfile(path, &record) {
                let _ = shutdown_child(&mut child, Duration::ZERO).await;
                self.release_files();
                return Err(StartError::new(format!(
                    "cannot write pid file {}: {e}",
                    path.display()
                ))
                .into());
            }
        }

        Ok(RunningServer {
            child,
            pid: booted.pid,
            channel: ControlChannel::new(booted.endpoint, self.config.request_timeout),
        })
    }

    /// Stop the server. Stopping a server that is not running is a no-op.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut state = self.lifecycle.lock().await;
        self.started.store(false, Ordering::SeqCst);

        let previous = std::mem::replace(&mut *state, Lifecycle::Stopped);
        let Lifecycle::Running(running) = previous else {
            if let Lifecycle::Idle = previous {
                *state = Lifecycle::Idle;
            }
            return Ok(());
        };

        let result = self.terminate(running).await;
        self.release_files();
        result
    }

    async fn terminate(&self, running: RunningServer) -> Result<(), ServerError> {
        let RunningServer {
            mut child,
            pid,
            channel,
        } = running;
        info!(server = self.program.name(), pid, "Stopping server");

        match channel.with_timeout(self.config.ping_timeout).shutdown().await {
            Ok(()) => debug!(pid, "Shutdown acknowledged"),
            Err(e) => debug!(pid, error = %e, "Shutdown request failed, signalling instead"),
        }

        match timeout(self.config.stop_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid, %status, "Server exited");
                Ok(())
            }
            _ => {
                warn!(pid, grace = ?self.config.stop_grace, "Server did not exit in time, terminating");
                shutdown_child(&mut child, self.config.stop_grace)
                    .await
                    .map(drop)
                    .map_err(ServerError::from)
            }
        }
    }

    /// Stop, then start.
    pub async fn restart(&self) -> Result<(), ServerError> {
        self.stop().await?;
        self.start().await
    }

    /// Liveness check: does the running child answer with its own PID?
    ///
    /// # Errors
    ///
    /// [`ServerError::NeverStarted`] before any call to `start`.
    pub async fn ping(&self) -> Result<bool, ServerError> {
        if !self.attempted.load(Ordering::SeqCst) {
            return Err(ServerError::NeverStarted);
        }
        match self.liveness().await {
            Liveness::Alive { pid, channel } => Ok(channel
                .with_timeout(self.config.ping_timeout)
                .ping_pid(pid)
                .await
                .is_ok()),
            Liveness::NotStarted | Liveness::Exited { .. } => Ok(false),
        }
    }

    /// In-memory view of whether the server is running. Performs no I/O.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// The server's own status report.
    pub async fn status(&self) -> Result<StatusReport, ServerError> {
        if !self.attempted.load(Ordering::SeqCst) {
            return Err(ServerError::NeverStarted);
        }
        match self.liveness().await {
            Liveness::Alive { channel, .. } => Ok(channel.status().await?),
            Liveness::NotStarted | Liveness::Exited { .. } => Err(ServerError::NotRunning),
        }
    }

    /// PID of the running child.
    pub async fn pid(&self) -> Option<u32> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running(running) => Some(running.pid),
            _ => None,
        }
    }

    /// Endpoint of the running child, as it reported it.
    pub async fn endpoint(&self) -> Option<Endpoint> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running(running) => Some(running.channel.endpoint().clone()),
            _ => None,
        }
    }

    /// Current state, reaping the child if it exited.
    pub async fn state(&self) -> ProcessState {
        match self.liveness().await {
            Liveness::Alive { .. } => ProcessState::Running,
            Liveness::Exited { .. } => ProcessState::Crashed,
            Liveness::NotStarted => ProcessState::Stopped,
        }
    }

    /// Check whether the child is still running.
    ///
    /// An exited child is reaped, its files removed and the state moved to
    /// crashed. The lock is held only for the check itself.
    pub async fn liveness(&self) -> Liveness {
        let mut state = self.lifecycle.lock().await;
        let (pid, status) = match &mut *state {
            Lifecycle::Running(running) => match running.child.try_wait() {
                Ok(None) => {
                    return Liveness::Alive {
                        pid: running.pid,
                        channel: running.channel.clone(),
                    };
                }
                Ok(Some(status)) => (running.pid, status.to_string()),
                Err(e) => (running.pid, e.to_string()),
            },
            Lifecycle::Crashed { pid, status } => {
                return Liveness::Exited {
                    pid: *pid,
                    status: status.clone(),
                };
            }
            Lifecycle::Idle | Lifecycle::Stopped => return Liveness::NotStarted,
        };

        warn!(server = self.program.name(), pid, %status, "Server exited unexpectedly");
        self.release_files();
        self.started.store(false, Ordering::SeqCst);
        *state = Lifecycle::Crashed {
            pid,
            status: status.clone(),
        };
        Liveness::Exited { pid, status }
    }

    /// Stop supervising without stopping the child.
    ///
    /// The pid file stays, so a later [`AbstractServer::stop_recorded`]
    /// or a new supervisor can find the server. Returns the child's PID.
    pub async fn detach(&self) -> Option<u32> {
        let mut state = self.lifecycle.lock().await;
        match std::mem::replace(&mut *state, Lifecycle::Stopped) {
            Lifecycle::Running(running) => {
                self.started.store(false, Ordering::SeqCst);
                info!(server = self.program.name(), pid = running.pid, "Detached from server");
                Some(running.pid)
            }
            other => {
                *state = other;
                None
            }
        }
    }

    /// Look for a server that is already answering for this pid file or endpoint.
    ///
    /// The pid file is consulted first. Without a usable record, a unix
    /// endpoint that accepts connections still counts as running.
    pub async fn find_existing(
        pidfile: Option<&Path>,
        endpoint: &Endpoint,
        ping_timeout: Duration,
    ) -> Option<AlreadyRunning> {
        if let Some(path) = pidfile {
            match read_pidfile(path) {
                Ok(record) => {
                    if let Some(found) = ping_endpoint(&record.endpoint, ping_timeout).await {
                        if found.pid().is_some_and(|pid| pid != record.pid) {
                            warn!(
                                recorded = record.pid,
                                "Pid file disagrees with the process answering on its endpoint"
                            );
                        }
                        return Some(found);
                    }
                    debug!(pid = record.pid, "Pid file is stale");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable pid file"),
            }
        }

        if endpoint.unix_path().is_some_and(Path::exists) {
            return ping_endpoint(endpoint, ping_timeout).await;
        }
        None
    }

    /// Stop a server known only from its pid file.
    ///
    /// Asks for a graceful shutdown first. Signals are sent only if the
    /// recorded PID is verified to be `agent`.
    pub async fn stop_recorded(
        pidfile: &Path,
        agent: &Path,
        grace: Duration,
        ping_timeout: Duration,
    ) -> Result<RecordedStop, ServerError> {
        let record = match read_pidfile(pidfile) {
            Ok(record) => record,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RecordedStop::NotRunning),
            Err(e) => {
                warn!(path = %pidfile.display(), error = %e, "Removing unreadable pid file");
                delete_pidfile(pidfile)?;
                return Ok(RecordedStop::NotRunning);
            }
        };

        let outcome = if !is_live_process(record.pid) {
            RecordedStop::NotRunning
        } else {
            let channel = ControlChannel::new(record.endpoint.clone(), ping_timeout);
            match channel.shutdown().await {
                Ok(()) => debug!(pid = record.pid, "Shutdown acknowledged"),
                Err(e) => debug!(pid = record.pid, error = %e, "Shutdown request failed"),
            }

            if wait_for_exit(record.pid, grace).await {
                RecordedStop::Stopped(record.pid)
            } else if is_agent_process(record.pid, agent) {
                kill_pid(record.pid, grace).await?;
                RecordedStop::Stopped(record.pid)
            } else {
                warn!(pid = record.pid, "Recorded PID is not an agent process, not signalling it");
                RecordedStop::Stale(record.pid)
            }
        };

        delete_pidfile(pidfile)?;
        remove_socket(&record.endpoint);
        Ok(outcome)
    }

    fn release_files(&self) {
        remove_socket(&self.config.endpoint);
        if let Some(path) = &self.config.pidfile
            && let Err(e) = delete_pidfile(path)
        {
            warn!(path = %path.display(), error = %e, "Failed to remove pid file");
        }
    }
}

impl Drop for AbstractServer {
    fn drop(&mut self) {
        let killed = match self.lifecycle.get_mut() {
            Lifecycle::Running(running) => {
                let _ = running.child.start_kill();
                #[cfg(unix)]
                crate::process::sweep_group(running.pid);
                Some(running.pid)
            }
            _ => None,
        };
        if let Some(pid) = killed {
            debug!(server = self.program.name(), pid, "Killed server on drop");
            self.release_files();
        }
    }
}

#[async_trait]
impl SupervisedServer for AbstractServer {
    async fn start(&self) -> Result<(), ServerError> {
        Self::start(self).await
    }

    async fn stop(&self) -> Result<(), ServerError> {
        Self::stop(self).await
    }

    async fn ping(&self) -> Result<bool, ServerError> {
        Self::ping(self).await
    }

    fn is_started(&self) -> bool {
        Self::is_started(self)
    }
}

/// Classify whatever answers on `endpoint`.
///
/// A pong gives the PID. Something that accepts the connection but does
/// not speak the protocol is running with an unknown PID.
async fn ping_endpoint(endpoint: &Endpoint, ping_timeout: Duration) -> Option<AlreadyRunning> {
    match ControlChannel::new(endpoint.clone(), ping_timeout).ping().await {
        Ok(pid) => Some(AlreadyRunning::Pid(pid)),
        Err(ChannelError::Unreachable { .. }) => None,
        Err(e) => {
            debug!(%endpoint, error = %e, "Endpoint is taken by an unresponsive process");
            Some(AlreadyRunning::PidUnknown)
        }
    }
}

fn remove_socket(endpoint: &Endpoint) {
    if let Some(path) = endpoint.unix_path() {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed socket file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove socket file"),
        }
    }
}
