//! Terminate a process known only by PID.

use std::io;
use std::time::Duration;

#[cfg(unix)]
use nix::sys::signal::Signal;
use tokio::time::{Instant, sleep};

use crate::pidfile::is_live_process;

#[cfg(unix)]
use super::group::{signal_tree, sweep_group};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(unix)]
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Kill a process and the group it leads by PID, with SIGTERM → SIGKILL
/// escalation.
///
/// Cannot reap: the caller is not the parent. A zombie counts as exited,
/// so a child awaiting its parent's `wait` does not stall the escalation.
///
/// Returns `Ok(())` once the process is gone (or was never there).
pub async fn kill_pid(pid: u32, grace: Duration) -> io::Result<()> {
    #[cfg(unix)]
    {
        kill_pid_unix(pid, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, grace);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "killing by PID is not supported on this platform",
        ))
    }
}

#[cfg(unix)]
async fn kill_pid_unix(pid: u32, grace: Duration) -> io::Result<()> {
    if !signal_tree(pid, Signal::SIGTERM)? || wait_for_exit(pid, grace).await {
        sweep_group(pid);
        return Ok(());
    }

    tracing::debug!(pid, "Process survived SIGTERM, sending SIGKILL");
    if !signal_tree(pid, Signal::SIGKILL)? || wait_for_exit(pid, KILL_WAIT).await {
        sweep_group(pid);
        return Ok(());
    }

    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("process {pid} did not exit after SIGKILL"),
    ))
}

/// Poll until `pid` is gone or a zombie. `false` if still alive after `within`.
pub async fn wait_for_exit(pid: u32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if !is_live_process(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}
