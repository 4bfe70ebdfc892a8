//! Error taxonomy for supervision and spawning.
//!
//! None of these errors are retried internally. They are reported to the
//! immediate caller, which decides whether to retry, fall back to another
//! spawn strategy, or surface the failure.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Output captured from a process that failed to become ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Exit status, when the process exited.
    pub exit_status: Option<String>,
    /// The application's own error output, verbatim.
    pub app_output: Option<String>,
    /// Last lines the process wrote to stderr.
    pub stderr_tail: Vec<String>,
}

impl Diagnostics {
    /// True when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.exit_status.is_none() && self.app_output.is_none() && self.stderr_tail.is_empty()
    }

    /// Attach the application's output.
    #[must_use]
    pub fn with_app_output(mut self, output: impl Into<String>) -> Self {
        self.app_output = Some(output.into());
        self
    }

    /// Attach an exit status description.
    #[must_use]
    pub fn with_exit_status(mut self, status: impl fmt::Display) -> Self {
        self.exit_status = Some(status.to_string());
        self
    }

    /// Attach the stderr tail.
    #[must_use]
    pub fn with_stderr_tail(mut self, lines: Vec<String>) -> Self {
        self.stderr_tail = lines;
        self
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = &self.exit_status {
            writeln!(f, "exit status: {status}")?;
        }
        if let Some(output) = &self.app_output {
            writeln!(f, "application output:")?;
            write!(f, "{output}")?;
            if !output.ends_with('\n') {
                writeln!(f)?;
            }
        }
        if !self.stderr_tail.is_empty() {
            writeln!(f, "stderr (last {} lines):", self.stderr_tail.len())?;
            for line in &self.stderr_tail {
                writeln!(f, "  {line}")?;
            }
        }
        Ok(())
    }
}

fn fmt_failure(f: &mut fmt::Formatter<'_>, message: &str, diagnostics: &Diagnostics) -> fmt::Result {
    write!(f, "{message}")?;
    if !diagnostics.is_empty() {
        write!(f, "\n{diagnostics}")?;
    }
    Ok(())
}

/// A supervised process failed to reach readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartError {
    pub message: String,
    pub diagnostics: Diagnostics,
}

impl StartError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            diagnostics: Diagnostics::default(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The application's own output, if the failure came from the application.
    pub fn app_output(&self) -> Option<&str> {
        self.diagnostics.app_output.as_deref()
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_failure(f, &self.message, &self.diagnostics)
    }
}

impl std::error::Error for StartError {}

/// A single `spawn_application` call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnError {
    pub message: String,
    pub diagnostics: Diagnostics,
}

impl SpawnError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            diagnostics: Diagnostics::default(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn app_output(&self) -> Option<&str> {
        self.diagnostics.app_output.as_deref()
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_failure(f, &self.message, &self.diagnostics)
    }
}

impl std::error::Error for SpawnError {}

impl From<StartError> for SpawnError {
    fn from(err: StartError) -> Self {
        Self {
            message: err.message,
            diagnostics: err.diagnostics,
        }
    }
}

/// Pid of a server that was found already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlreadyRunning {
    /// The running server's pid is known.
    Pid(u32),
    /// The server answers on its endpoint but its pid could not be determined.
    PidUnknown,
}

impl AlreadyRunning {
    pub const fn pid(self) -> Option<u32> {
        match self {
            Self::Pid(pid) => Some(pid),
            Self::PidUnknown => None,
        }
    }
}

impl fmt::Display for AlreadyRunning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid(pid) => write!(f, "on PID {pid}"),
            Self::PidUnknown => write!(f, "(PID unknown)"),
        }
    }
}

/// Malformed or unexpected traffic on a control channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("message exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("connection closed before a response was received")]
    Closed,

    #[error("expected {expected} response, got {got}")]
    UnexpectedResponse { expected: &'static str, got: String },

    #[error("endpoint is served by PID {actual}, expected PID {expected}")]
    PidMismatch { expected: u32, actual: u32 },
}

/// Invalid spawn options, detected before any process is created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("application root {0} does not exist")]
    AppRootMissing(PathBuf),

    #[error("application root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("application root {path} is not readable: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("startup file {0} does not exist")]
    StartupFileMissing(PathBuf),

    #[error("startup file must be relative to the application root: {0}")]
    AbsoluteStartupFile(PathBuf),

    #[error("environment name cannot be empty")]
    EmptyEnvironment,

    #[error("invalid environment variable name '{0}'")]
    InvalidEnvKey(String),

    #[error("unknown spawn method '{0}' (expected 'smart' or 'conservative')")]
    UnknownSpawnMethod(String),

    #[error("backend preloaded {preloaded}, cannot spawn {requested}")]
    AppRootMismatch {
        preloaded: PathBuf,
        requested: PathBuf,
    },

    #[error("backend preloaded startup file {preloaded}, cannot spawn with {requested}")]
    StartupFileMismatch {
        preloaded: PathBuf,
        requested: PathBuf,
    },

    #[error("backend preloaded the '{preloaded}' environment, cannot spawn for '{requested}'")]
    EnvironmentMismatch { preloaded: String, requested: String },

    #[error("unknown user '{0}'")]
    UnknownUser(String),
}

/// Errors from the supervision contract.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Start(#[from] StartError),

    #[error("server is already running {0}")]
    AlreadyStarted(AlreadyRunning),

    /// Programmer error: the server was queried before any start attempt.
    #[error("server was used before any start attempt")]
    NeverStarted,

    #[error("server is not running")]
    NotRunning,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the spawner contract.
#[derive(Debug, Error)]
pub enum SpawnerError {
    #[error("failed to spawn application: {0}")]
    Spawn(#[from] SpawnError),

    #[error("preloading backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid spawn options: {0}")]
    InvalidOptions(#[from] OptionsError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_includes_app_output_verbatim() {
        let output = "LoadError: cannot load such file -- missing_gem\n  from startup.sh:3\n";
        let err = StartError::new("application failed to load")
            .with_diagnostics(Diagnostics::default().with_app_output(output));
        let text = err.to_string();
        assert!(text.starts_with("application failed to load\n"));
        assert!(text.contains(output));
        assert_eq!(err.app_output(), Some(output));
    }

    #[test]
    fn empty_diagnostics_render_message_only() {
        let err = SpawnError::new("worker handshake timed out");
        assert_eq!(err.to_string(), "worker handshake timed out");
    }

    #[test]
    fn diagnostics_render_stderr_tail() {
        let diag = Diagnostics::default()
            .with_exit_status(3)
            .with_stderr_tail(vec!["a".into(), "b".into()]);
        let text = diag.to_string();
        assert!(text.starts_with("exit status: 3\n"));
        assert!(text.contains("stderr (last 2 lines):"));
        assert!(text.contains("  b\n"));
    }

    #[test]
    fn already_running_formats_pid() {
        let known = ServerError::AlreadyStarted(AlreadyRunning::Pid(4242));
        let unknown = ServerError::AlreadyStarted(AlreadyRunning::PidUnknown);
        assert_eq!(known.to_string(), "server is already running on PID 4242");
        assert_eq!(unknown.to_string(), "server is already running (PID unknown)");
        assert_eq!(AlreadyRunning::PidUnknown.pid(), None);
    }

    #[test]
    fn start_error_converts_to_spawn_error() {
        let start = StartError::new("boom")
            .with_diagnostics(Diagnostics::default().with_app_output("trace"));
        let spawn: SpawnError = start.into();
        assert_eq!(spawn.app_output(), Some("trace"));
    }
}
