//! Signalling an agent together with the processes it started.
//!
//! Agents are launched as process-group leaders, so the application's
//! startup file and anything it forks share the agent's group. Signalling
//! the group reaches them even when the agent dies first.

use std::io;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Convert to a nix pid, refusing values `kill(2)` would read as a group.
fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|raw| *raw > 0).map(Pid::from_raw)
}

/// Signal `pid` alone. `Ok(false)` when it no longer exists.
pub fn signal_process(pid: u32, sig: Signal) -> io::Result<bool> {
    let Some(target) = to_pid(pid) else {
        return Ok(false);
    };
    match signal::kill(target, sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

/// Signal the group led by `pid`. `Ok(false)` when no such group exists.
pub fn signal_group(pid: u32, sig: Signal) -> io::Result<bool> {
    let Some(target) = to_pid(pid) else {
        return Ok(false);
    };
    match signal::killpg(target, sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

/// Signal `pid` and the group it leads, if any.
///
/// `Ok(false)` when neither the process nor the group exists.
pub fn signal_tree(pid: u32, sig: Signal) -> io::Result<bool> {
    let process = signal_process(pid, sig)?;
    let group = signal_group(pid, sig).unwrap_or_else(|e| {
        tracing::debug!(pid, error = %e, "Could not signal process group");
        false
    });
    Ok(process || group)
}

/// SIGKILL whatever is left in the group of an exited leader.
pub fn sweep_group(pid: u32) {
    match signal_group(pid, Signal::SIGKILL) {
        Ok(true) => tracing::debug!(pid, "Killed leftover processes of group"),
        Ok(false) => {}
        Err(e) => tracing::debug!(pid, error = %e, "Could not sweep process group"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::process::Command;

    use crate::pidfile::is_live_process;
    use crate::process::wait_for_exit;

    #[test]
    fn out_of_range_pids_are_never_signalled() {
        assert!(!signal_process(u32::MAX, Signal::SIGTERM).unwrap());
        assert!(!signal_group(0, Signal::SIGTERM).unwrap());
    }

    #[tokio::test]
    async fn group_signal_reaches_grandchildren() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("sleeper.pid");
        let mut leader = Command::new("sh")
            .arg("-c")
            .arg(format!("sleep 30 & echo $! > {}; wait", marker.display()))
            .process_group(0)
            .spawn()
            .unwrap();
        let leader_pid = leader.id().unwrap();

        let mut sleeper = None;
        for _ in 0..50 {
            if let Some(pid) = std::fs::read_to_string(&marker)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok())
            {
                sleeper = Some(pid);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let sleeper = sleeper.expect("sleeper started");

        // Kill only the leader; the grandchild lingers.
        signal_process(leader_pid, Signal::SIGKILL).unwrap();
        leader.wait().await.unwrap();
        assert!(is_live_process(sleeper));

        sweep_group(leader_pid);
        assert!(wait_for_exit(sleeper, Duration::from_secs(2)).await);
    }
}
