//! Starting an agent process and waiting for it to prove readiness.
//!
//! Readiness has two parts: the child writes a `ready` handshake on
//! stdout, then answers a ping on the endpoint it reported with its own
//! PID. Anything else (timeout, early exit, a `failed` handshake, a
//! different PID on the endpoint) kills the child and produces a
//! [`StartError`] carrying whatever the child said.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use appspawn_core::protocol::{Handshake, decode_frame};
use appspawn_core::{Diagnostics, Endpoint, StartError};

use crate::channel::ControlChannel;
use crate::frame::{read_frame, write_frame};
use crate::process::{DIAGNOSTIC_TAIL_LINES, DiagnosticsBuffer, spawn_stream_reader};
#[cfg(unix)]
use crate::process::{signal_tree, sweep_group};

#[cfg(unix)]
use nix::sys::signal::Signal;

/// How long to wait for a failed child to exit after its handshake.
pub const EXIT_WAIT: Duration = Duration::from_secs(2);

/// Where a child's stderr goes.
#[derive(Debug, Clone)]
pub enum StderrTarget {
    /// Piped into a [`DiagnosticsBuffer`] and the tracing output.
    Capture,
    /// Appended to a log file, for processes that outlive their supervisor.
    File(PathBuf),
}

/// What to expect from a booting child.
#[derive(Debug, Clone)]
pub struct BootSpec {
    /// Endpoint the child was asked to listen on.
    pub endpoint: Endpoint,
    /// Deadline for the handshake and the verifying ping together.
    pub timeout: Duration,
    /// Deadline for the verifying ping alone.
    pub ping_timeout: Duration,
    /// Keep stdin open after the boot frame, as an owner pipe.
    pub keep_stdin: bool,
}

/// A child that has been created but not yet verified.
pub struct LaunchedChild {
    child: Child,
    pid: u32,
    stdout: ChildStdout,
    stdin: Option<ChildStdin>,
    diagnostics: Arc<DiagnosticsBuffer>,
    stderr_task: Option<JoinHandle<()>>,
    stderr_file: Option<PathBuf>,
}

/// A child that completed its handshake and answered a ping.
pub struct BootedChild {
    pub child: Child,
    pub pid: u32,
    /// Endpoint as reported by the child (the real port for TCP).
    pub endpoint: Endpoint,
    /// Open stdin, when the boot spec asked to keep it.
    pub stdin: Option<ChildStdin>,
}

/// Create the child process. Does not wait for anything.
///
/// Kept separate from [`LaunchedChild::handshake`] so callers can hold a
/// lock around process creation only.
pub fn launch(mut cmd: Command, stderr: &StderrTarget) -> Result<LaunchedChild, StartError> {
    let stderr_file = match stderr {
        StderrTarget::Capture => {
            cmd.stderr(Stdio::piped());
            None
        }
        StderrTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    StartError::new(format!("cannot open log file {}: {e}", path.display()))
                })?;
            cmd.stderr(file);
            Some(path.clone())
        }
    };

    let mut child = cmd
        .spawn()
        .map_err(|e| StartError::new(format!("failed to launch agent: {e}")))?;

    let pid = child.id().unwrap_or_default();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| StartError::new("agent stdout was not captured"))?;
    let stdin = child.stdin.take();

    let diagnostics = Arc::new(DiagnosticsBuffer::new());
    let stderr_task = child
        .stderr
        .take()
        .map(|stream| spawn_stream_reader(stream, pid, "stderr", Arc::clone(&diagnostics)));

    debug!(pid, "Agent process created");
    Ok(LaunchedChild {
        child,
        pid,
        stdout,
        stdin,
        diagnostics,
        stderr_task,
        stderr_file,
    })
}

impl LaunchedChild {
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Send the boot frame and wait for the child to become ready.
    pub async fn handshake(mut self, boot_frame: &str, spec: &BootSpec) -> Result<BootedChild, StartError> {
        if let Some(stdin) = self.stdin.as_mut()
            && let Err(e) = write_frame(stdin, boot_frame).await
        {
            // The child is already gone; reading stdout below reports it.
            debug!(pid = self.pid, error = %e, "Could not write boot frame");
        }
        if !spec.keep_stdin {
            self.stdin = None;
        }

        let (outcome, patience) = match timeout(spec.timeout, self.await_ready(spec)).await {
            Ok(outcome) => (outcome, EXIT_WAIT),
            Err(_) => (
                Err(StartError::new(format!(
                    "agent (PID {}) did not become ready within {:?}",
                    self.pid, spec.timeout
                ))),
                Duration::ZERO,
            ),
        };

        match outcome {
            Ok(endpoint) => Ok(BootedChild {
                child: self.child,
                pid: self.pid,
                endpoint,
                stdin: self.stdin,
            }),
            Err(err) => Err(self.abort(err, &spec.endpoint, patience).await),
        }
    }

    async fn await_ready(&mut self, spec: &BootSpec) -> Result<Endpoint, StartError> {
        let mut reader = BufReader::new(&mut self.stdout);
        let line = match read_frame(&mut reader).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                return Err(StartError::new(format!(
                    "agent (PID {}) exited before completing its handshake",
                    self.pid
                )));
            }
            Err(e) => return Err(StartError::new(format!("cannot read handshake: {e}"))),
        };

        let handshake: Handshake = decode_frame(&line)
            .map_err(|e| StartError::new(format!("invalid handshake from agent: {e}")))?;

        let (pid, endpoint) = match handshake {
            Handshake::Ready { pid, endpoint } => (pid, endpoint),
            Handshake::Failed {
                message,
                app_output,
            } => {
                let mut diagnostics = Diagnostics::default();
                diagnostics.app_output = app_output;
                return Err(StartError::new(message).with_diagnostics(diagnostics));
            }
        };

        if pid != self.pid {
            return Err(StartError::new(format!(
                "agent reported PID {pid} but was started as PID {}",
                self.pid
            )));
        }
        if !endpoint_matches(&spec.endpoint, &endpoint) {
            return Err(StartError::new(format!(
                "agent reported endpoint {endpoint}, expected {}",
                spec.endpoint
            )));
        }

        ControlChannel::new(endpoint.clone(), spec.ping_timeout)
            .ping_pid(self.pid)
            .await
            .map_err(|e| StartError::new(format!("agent is not answering on {endpoint}: {e}")))?;

        debug!(pid, %endpoint, "Agent ready");
        Ok(endpoint)
    }

    /// Kill the child and turn `err` into a full report.
    ///
    /// `patience` is how long a child that reported its own failure gets to
    /// exit on its own; a child that missed its deadline gets none.
    async fn abort(mut self, err: StartError, requested: &Endpoint, patience: Duration) -> StartError {
        self.stdin = None;
        let status = reap(&mut self.child, patience).await;

        if let Some(task) = self.stderr_task.take() {
            let _ = timeout(Duration::from_millis(500), task).await;
        }
        if let Some(path) = requested.unix_path() {
            let _ = std::fs::remove_file(path);
        }

        let mut diagnostics = err.diagnostics;
        if diagnostics.exit_status.is_none()
            && let Some(status) = status
        {
            diagnostics.exit_status = Some(status.to_string());
        }
        if diagnostics.stderr_tail.is_empty() {
            diagnostics.stderr_tail = match &self.stderr_file {
                Some(path) => file_tail(path, DIAGNOSTIC_TAIL_LINES),
                None => self.diagnostics.tail(DIAGNOSTIC_TAIL_LINES),
            };
        }

        StartError::new(err.message).with_diagnostics(diagnostics)
    }
}

/// Reap a ready child in the background once it exits.
///
/// The child's socket file is removed afterwards in case it was killed
/// before it could clean up.
pub fn reap_in_background(mut child: Child, pid: u32, endpoint: Endpoint) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(pid, %status, "Process exited"),
            Err(e) => debug!(pid, error = %e, "Failed to wait for process"),
        }
        if let Some(path) = endpoint.unix_path() {
            let _ = std::fs::remove_file(path);
        }
    });
}

/// Wait up to `patience` for a voluntary exit, then kill the child and
/// everything left in its process group.
async fn reap(child: &mut Child, patience: Duration) -> Option<ExitStatus> {
    let pid = child.id();
    let status = match timeout(patience, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        _ => {
            if !pid.is_some_and(kill_group) {
                let _ = child.start_kill();
            }
            child.wait().await.ok()
        }
    };
    if let Some(pid) = pid {
        sweep(pid);
    }
    status
}

#[cfg(unix)]
fn kill_group(pid: u32) -> bool {
    matches!(signal_tree(pid, Signal::SIGKILL), Ok(true))
}

#[cfg(not(unix))]
const fn kill_group(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn sweep(pid: u32) {
    sweep_group(pid);
}

#[cfg(not(unix))]
const fn sweep(_pid: u32) {}

/// Whether a reported endpoint is acceptable for the requested one.
///
/// Unbound TCP requests accept any loopback port; everything else must
/// match exactly.
fn endpoint_matches(requested: &Endpoint, reported: &Endpoint) -> bool {
    match (requested, reported) {
        (Endpoint::Tcp(want), Endpoint::Tcp(got)) if requested.is_unbound() => {
            want.ip() == got.ip() && got.port() != 0
        }
        _ => requested == reported,
    }
}

fn file_tail(path: &std::path::Path, n: usize) -> Vec<String> {
    std::fs::read(path)
        .map(|bytes| {
            let text = String::from_utf8_lossy(&bytes);
            let lines: Vec<&str> = text.lines().collect();
            let skip = lines.len().saturating_sub(n);
            lines[skip..].iter().map(|l| (*l).to_string()).collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(endpoint: Endpoint) -> BootSpec {
        BootSpec {
            endpoint,
            timeout: Duration::from_secs(2),
            ping_timeout: Duration::from_millis(500),
            keep_stdin: false,
        }
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());
        cmd
    }

    #[test]
    fn unbound_tcp_accepts_real_port() {
        let requested = Endpoint::loopback_unbound();
        assert!(endpoint_matches(
            &requested,
            &"tcp://127.0.0.1:4100".parse().unwrap()
        ));
        assert!(!endpoint_matches(
            &requested,
            &"unix:/tmp/x.sock".parse().unwrap()
        ));
        let fixed: Endpoint = "unix:/tmp/a.sock".parse().unwrap();
        assert!(!endpoint_matches(&fixed, &"unix:/tmp/b.sock".parse().unwrap()));
    }

    #[tokio::test]
    async fn early_exit_reports_stderr() {
        let child = launch(
            sh("read line; echo 'cannot load app' >&2; exit 3"),
            &StderrTarget::Capture,
        )
        .unwrap();

        let err = child
            .handshake("{}\n", &spec("unix:/tmp/appspawn-never.sock".parse().unwrap()))
            .await
            .err()
            .unwrap();

        assert!(err.message.contains("exited before completing its handshake"));
        assert!(err.diagnostics.exit_status.is_some());
        assert_eq!(err.diagnostics.stderr_tail, vec!["cannot load app"]);
    }

    #[tokio::test]
    async fn failed_handshake_carries_app_output() {
        let child = launch(
            sh(r#"read line; printf '%s\n' '{"status":"failed","message":"load failed","app_output":"boom\n"}'"#),
            &StderrTarget::Capture,
        )
        .unwrap();

        let err = child
            .handshake("{}\n", &spec("unix:/tmp/appspawn-never.sock".parse().unwrap()))
            .await
            .err()
            .unwrap();

        assert_eq!(err.message, "load failed");
        assert_eq!(err.app_output(), Some("boom\n"));
    }

    #[tokio::test]
    async fn silent_child_times_out_and_is_killed() {
        let child = launch(sh("sleep 30"), &StderrTarget::Capture).unwrap();
        let pid = child.pid();

        let mut spec = spec("unix:/tmp/appspawn-never.sock".parse().unwrap());
        spec.timeout = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let err = child.handshake("{}\n", &spec).await.err().unwrap();

        assert!(err.message.contains("did not become ready"));
        assert!(!crate::pidfile::is_live_process(pid));
        // Killed at the deadline, without waiting for a voluntary exit.
        assert!(started.elapsed() < spec.timeout + EXIT_WAIT);
    }

    #[tokio::test]
    async fn ready_without_listener_is_rejected() {
        let script = r#"read line; echo "{\"status\":\"ready\",\"pid\":$$,\"endpoint\":\"unix:/tmp/appspawn-nobody.sock\"}"; sleep 5"#;
        let child = launch(sh(script), &StderrTarget::Capture).unwrap();

        let err = child
            .handshake("{}\n", &spec("unix:/tmp/appspawn-nobody.sock".parse().unwrap()))
            .await
            .err()
            .unwrap();

        assert!(err.message.contains("not answering"));
    }
}
