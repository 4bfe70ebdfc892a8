//! Process verification before trusting or signalling a recorded PID.

use std::path::Path;

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// Check if a PID belongs to the given agent binary.
///
/// # Platform behavior
/// - **Linux**: Reads `/proc/<pid>/exe`
/// - **Other**: Uses `sysinfo` to look up the executable path
///
/// Returns `false` whenever verification is impossible, so a reused PID
/// is never mistaken for an agent.
pub fn is_agent_process(pid: u32, agent: &Path) -> bool {
    let Some(actual) = process_exe(pid) else {
        return false;
    };

    match (actual.canonicalize(), agent.canonicalize()) {
        (Ok(actual), Ok(expected)) => actual == expected,
        _ => false,
    }
}

#[cfg(target_os = "linux")]
fn process_exe(pid: u32) -> Option<std::path::PathBuf> {
    std::fs::read_link(format!("/proc/{pid}/exe")).ok()
}

#[cfg(not(target_os = "linux"))]
fn process_exe(pid: u32) -> Option<std::path::PathBuf> {
    let mut sys = System::new();
    let pid = Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid)?.exe().map(Path::to_path_buf)
}

/// Check if a PID exists (without verifying it's our process).
///
/// Uses `kill` with the null signal. Zombies still count as existing.
#[cfg(unix)]
pub fn pid_exists(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid as NixPid;

    // Anything past i32::MAX would address a process group.
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match signal::kill(NixPid::from_raw(raw), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        // Exists, owned by another user
        Err(_) => true,
    }
}

#[cfg(not(unix))]
pub fn pid_exists(_pid: u32) -> bool {
    false
}

/// Whether a PID is running and not a zombie awaiting its parent.
pub fn is_live_process(pid: u32) -> bool {
    if !pid_exists(pid) {
        return false;
    }

    let mut system = System::new();
    let sys_pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);

    system
        .process(sys_pid)
        .is_none_or(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
}
