//! Stopping individual workers.

use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use appspawn_core::ProcessHandle;

use crate::channel::ControlChannel;
use crate::pidfile::{is_agent_process, is_live_process};
use crate::process::{kill_pid, wait_for_exit};

/// Outcome of [`stop_worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStop {
    Stopped,
    AlreadyGone,
    /// The PID is alive but is not the worker; nothing was signalled.
    NotOurs,
}

/// Stop a worker: close its owner pipe, ask it to shut down, then escalate.
///
/// Signals are only sent when the PID still answers on the handle's
/// endpoint, or, when `agent` is given, runs the agent binary.
pub async fn stop_worker(
    handle: &ProcessHandle,
    agent: Option<&Path>,
    grace: Duration,
    ping_timeout: Duration,
) -> io::Result<WorkerStop> {
    if let Some(pipe) = &handle.owner_pipe {
        pipe.close();
    }
    if !is_live_process(handle.pid) {
        return Ok(WorkerStop::AlreadyGone);
    }

    let channel = ControlChannel::new(handle.endpoint.clone(), ping_timeout);
    let verified = match channel.ping().await {
        Ok(pid) if pid == handle.pid => {
            if let Err(e) = channel.shutdown().await {
                debug!(pid, error = %e, "Shutdown request failed");
            }
            true
        }
        Ok(other) => {
            warn!(expected = handle.pid, answered = other, "Endpoint is served by another process");
            false
        }
        Err(e) => {
            debug!(pid = handle.pid, error = %e, "Worker is not answering");
            agent.is_some_and(|agent| is_agent_process(handle.pid, agent))
        }
    };

    if wait_for_exit(handle.pid, grace).await {
        return Ok(WorkerStop::Stopped);
    }
    if !verified {
        return Ok(WorkerStop::NotOurs);
    }
    kill_pid(handle.pid, grace).await?;
    Ok(WorkerStop::Stopped)
}
