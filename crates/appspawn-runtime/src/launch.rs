//! Building agent command lines.
//!
//! Everything that creates an agent process goes through here: the agent
//! binary lookup, fresh endpoint allocation and the user switch.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use appspawn_core::{AgentRole, Endpoint, OptionsError, Settings, Transport};

use crate::error::SetupError;

/// Name of the agent binary.
pub const AGENT_BINARY: &str = "appspawn-agent";

/// Environment variable overriding the agent binary location.
pub const AGENT_ENV_VAR: &str = "APPSPAWN_AGENT";

/// Locate the agent binary.
///
/// Resolution order:
/// 1. `settings.agent_path` (filled from `APPSPAWN_AGENT` by `Settings::from_env`)
/// 2. Next to the current executable (or one directory up, for test harnesses)
/// 3. `PATH`
pub fn resolve_agent_path(settings: &Settings) -> Result<PathBuf, SetupError> {
    if let Some(path) = &settings.agent_path {
        if path.is_file() {
            debug!("Using agent from settings: {}", path.display());
            return Ok(path.clone());
        }
        return Err(SetupError::AgentNotFound(format!(
            "{} does not exist",
            path.display()
        )));
    }

    if let Some(path) = sibling_agent() {
        debug!("Using agent next to current executable: {}", path.display());
        return Ok(path);
    }

    which::which(AGENT_BINARY).map_err(|e| {
        SetupError::AgentNotFound(format!(
            "{AGENT_BINARY} not found next to this executable or on PATH ({e}); set {AGENT_ENV_VAR}"
        ))
    })
}

fn sibling_agent() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    [Some(dir), dir.parent()]
        .into_iter()
        .flatten()
        .map(|d| d.join(AGENT_BINARY))
        .find(|candidate| candidate.is_file())
}

/// A fresh endpoint that no live process is serving.
///
/// Unix endpoints get a random socket name under `sockets_dir`; TCP
/// endpoints are left unbound so the child picks a free port itself.
pub fn allocate_endpoint(transport: Transport, sockets_dir: &Path, prefix: &str) -> Endpoint {
    match transport {
        Transport::Unix => Endpoint::Unix(
            sockets_dir.join(format!("{prefix}-{}.sock", Uuid::new_v4().simple())),
        ),
        Transport::Tcp => Endpoint::loopback_unbound(),
    }
}

/// Agent command for `role`, listening on `endpoint`.
///
/// All three standard streams are piped: stdin carries the boot frame,
/// stdout the handshake, stderr the diagnostics. The agent leads a new
/// process group, which the application's processes join.
pub fn agent_command(agent: &Path, role: AgentRole, endpoint: &Endpoint) -> Command {
    let mut cmd = Command::new(agent);
    cmd.arg(role.to_string())
        .arg("--endpoint")
        .arg(endpoint.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Numeric identity an agent should switch to before running application code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunAs {
    pub uid: u32,
    pub gid: u32,
}

impl RunAs {
    /// Apply the identity to a command.
    pub fn apply(self, cmd: &mut Command) {
        #[cfg(unix)]
        {
            cmd.uid(self.uid).gid(self.gid);
        }
        #[cfg(not(unix))]
        {
            let _ = cmd;
        }
    }
}

/// Resolve the user a spawn asks for.
///
/// An unknown user is always an error. A known user is only switched to
/// when running as root; otherwise processes run as the current user and
/// a request for somebody else is logged and ignored.
#[cfg(unix)]
pub fn resolve_run_as(user: Option<&str>) -> Result<Option<RunAs>, OptionsError> {
    use nix::unistd::{User, geteuid};

    let Some(name) = user else {
        return Ok(None);
    };

    let entry = User::from_name(name)
        .ok()
        .flatten()
        .ok_or_else(|| OptionsError::UnknownUser(name.to_string()))?;

    let current = geteuid();
    if current.is_root() {
        return Ok(Some(RunAs {
            uid: entry.uid.as_raw(),
            gid: entry.gid.as_raw(),
        }));
    }

    if entry.uid != current {
        warn!(
            user = name,
            "Not running as root, spawning as the current user instead"
        );
    }
    Ok(None)
}

#[cfg(not(unix))]
pub fn resolve_run_as(user: Option<&str>) -> Result<Option<RunAs>, OptionsError> {
    match user {
        Some(name) => Err(OptionsError::UnknownUser(name.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unix_endpoints_are_unique() {
        let tmp = TempDir::new().unwrap();
        let a = allocate_endpoint(Transport::Unix, tmp.path(), "worker");
        let b = allocate_endpoint(Transport::Unix, tmp.path(), "worker");
        assert_ne!(a, b);
        assert!(a.unix_path().unwrap().starts_with(tmp.path()));
    }

    #[test]
    fn tcp_endpoints_start_unbound() {
        let tmp = TempDir::new().unwrap();
        assert!(allocate_endpoint(Transport::Tcp, tmp.path(), "worker").is_unbound());
    }

    #[test]
    fn explicit_agent_path_must_exist() {
        let settings = Settings {
            agent_path: Some(PathBuf::from("/nonexistent/appspawn-agent")),
            ..Settings::with_defaults()
        };
        assert!(matches!(
            resolve_agent_path(&settings),
            Err(SetupError::AgentNotFound(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn unknown_user_is_rejected() {
        let err = resolve_run_as(Some("appspawn-no-such-user")).unwrap_err();
        assert_eq!(err, OptionsError::UnknownUser("appspawn-no-such-user".into()));
    }

    #[test]
    #[cfg(unix)]
    fn no_user_means_no_switch() {
        assert_eq!(resolve_run_as(None).unwrap(), None);
    }
}
