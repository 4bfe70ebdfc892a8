//! SIGTERM → SIGKILL escalation for a `tokio::process::Child`.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
#[cfg(unix)]
use tokio::time::timeout;

#[cfg(unix)]
use nix::sys::signal::Signal;

#[cfg(unix)]
use super::group::{signal_tree, sweep_group};

/// Terminate a child and its process group, escalating to SIGKILL after
/// `grace`, and reap it.
///
/// A zero `grace` sends SIGTERM and kills immediately if the child has not
/// already exited. Returns the exit status once the process is reaped.
pub async fn shutdown_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    #[cfg(unix)]
    {
        shutdown_unix(child, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        child.kill().await?;
        child.wait().await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped by someone else.
        return child.wait().await;
    };

    if !signal_tree(pid, Signal::SIGTERM)? {
        return child.wait().await;
    }

    let status = match timeout(grace, child.wait()).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::debug!(pid, ?grace, "Child ignored SIGTERM, sending SIGKILL");
            if !signal_tree(pid, Signal::SIGKILL)? {
                child.start_kill()?;
            }
            child.wait().await?
        }
    };
    sweep_group(pid);
    Ok(status)
}
