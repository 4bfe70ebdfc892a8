//! CLI-specific error types and mappings.
//!
//! Maps runtime and core errors to exit codes and user-facing messages.

use thiserror::Error;

use appspawn_core::{AlreadyRunning, ServerError, SettingsError, SpawnerError, StartError};
use appspawn_runtime::{ChannelError, SetupError};

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Argument or spawn option error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// Configuration error (settings, run directory, agent binary).
    #[error("Configuration error: {0}")]
    Config(String),

    /// An option that only the enterprise edition supports was requested.
    #[error(
        "The '{option}' option is only available in the enterprise edition. \
         Pass --edition-options ignore to start without it."
    )]
    EditionOnly { option: &'static str },

    /// A backend is already running for the application.
    #[error("{}", already_running_message(.0))]
    AlreadyRunning(AlreadyRunning),

    /// The backend failed to load the application.
    #[error("Could not start the backend:\n{0}")]
    Start(StartError),

    /// A spawn request failed.
    #[error("Could not spawn the application: {0}")]
    Spawn(String),

    /// Nothing answers where something was expected.
    #[error("{0}")]
    Unavailable(String),

    /// No backend is recorded for the application.
    #[error("appspawn backend is not running.")]
    NotRunning,

    /// Process supervision error.
    #[error("Process error: {0}")]
    Process(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 0: Success
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 3: Not running (as for LSB `status`)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyRunning(_) | Self::Start(_) | Self::Spawn(_) => 1,
            Self::Arguments(_) => 2,
            Self::NotRunning => 3,
            Self::Unavailable(_) => 69, // EX_UNAVAILABLE
            Self::Process(_) => 71,     // EX_OSERR
            Self::Io(_) => 74,          // EX_IOERR
            Self::Config(_) | Self::EditionOnly { .. } => 78, // EX_CONFIG
        }
    }
}

/// Operator message for a backend found already running.
pub fn already_running_message(running: &AlreadyRunning) -> String {
    match running.pid() {
        Some(pid) => format!("appspawn backend is already running on PID {pid}."),
        None => "appspawn backend is already running.".to_string(),
    }
}

impl From<SetupError> for CliError {
    fn from(err: SetupError) -> Self {
        match err {
            SetupError::Options(e) => Self::Arguments(e.to_string()),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ServerError> for CliError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Start(e) => Self::Start(e),
            ServerError::AlreadyStarted(running) => Self::AlreadyRunning(running),
            ServerError::NotRunning => Self::NotRunning,
            ServerError::Io(e) => Self::Io(e.to_string()),
            other => Self::Process(other.to_string()),
        }
    }
}

impl From<SpawnerError> for CliError {
    fn from(err: SpawnerError) -> Self {
        match err {
            SpawnerError::InvalidOptions(e) => Self::Arguments(e.to_string()),
            SpawnerError::BackendUnavailable(msg) => Self::Unavailable(msg),
            SpawnerError::Spawn(e) => Self::Spawn(e.to_string()),
            SpawnerError::Protocol(e) => Self::Process(e.to_string()),
        }
    }
}

impl From<ChannelError> for CliError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Unreachable { .. } | ChannelError::TimedOut { .. } => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Process(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
