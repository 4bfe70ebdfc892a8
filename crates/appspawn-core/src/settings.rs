//! Settings domain types and validation.
//!
//! All fields are optional so that partial configuration (environment
//! variables, command-line flags) can be layered over the defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Transport;

/// Default time allowed for a supervised server to become ready.
pub const DEFAULT_START_TIMEOUT_SECS: u64 = 25;

/// Default time allowed for a single spawn request.
pub const DEFAULT_SPAWN_TIMEOUT_SECS: u64 = 25;

/// Default grace period between a shutdown request and SIGTERM.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;

/// Default liveness check timeout.
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 2_000;

/// Default timeout for ordinary control requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Supervisor and spawner settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Seconds a supervised server may take to become ready.
    pub start_timeout_secs: Option<u64>,

    /// Seconds a single spawn request may take.
    pub spawn_timeout_secs: Option<u64>,

    /// Seconds to wait for a graceful exit before escalating to signals.
    pub stop_grace_secs: Option<u64>,

    /// Milliseconds a ping may take.
    pub ping_timeout_ms: Option<u64>,

    /// Seconds an ordinary control request may take.
    pub request_timeout_secs: Option<u64>,

    /// Control channel transport for new servers and workers.
    pub transport: Option<Transport>,

    /// Path to the `appspawn-agent` binary.
    pub agent_path: Option<PathBuf>,

    /// Directory for pid files and sockets.
    pub run_dir: Option<PathBuf>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            start_timeout_secs: Some(DEFAULT_START_TIMEOUT_SECS),
            spawn_timeout_secs: Some(DEFAULT_SPAWN_TIMEOUT_SECS),
            stop_grace_secs: Some(DEFAULT_STOP_GRACE_SECS),
            ping_timeout_ms: Some(DEFAULT_PING_TIMEOUT_MS),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            transport: Some(Transport::Unix),
            agent_path: None,
            run_dir: None,
        }
    }

    /// Defaults overlaid with `APPSPAWN_*` environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = Self::with_defaults();

        let number = |key: &'static str| -> Result<Option<u64>, SettingsError> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|_| SettingsError::InvalidValue { key, value: raw })
                })
                .transpose()
        };

        if let Some(v) = number("APPSPAWN_START_TIMEOUT")? {
            settings.start_timeout_secs = Some(v);
        }
        if let Some(v) = number("APPSPAWN_SPAWN_TIMEOUT")? {
            settings.spawn_timeout_secs = Some(v);
        }
        if let Some(v) = number("APPSPAWN_STOP_GRACE")? {
            settings.stop_grace_secs = Some(v);
        }
        if let Some(v) = number("APPSPAWN_PING_TIMEOUT_MS")? {
            settings.ping_timeout_ms = Some(v);
        }
        if let Some(raw) = lookup("APPSPAWN_TRANSPORT") {
            let transport = raw.parse().map_err(|_| SettingsError::InvalidValue {
                key: "APPSPAWN_TRANSPORT",
                value: raw,
            })?;
            settings.transport = Some(transport);
        }
        if let Some(path) = lookup("APPSPAWN_AGENT").filter(|p| !p.is_empty()) {
            settings.agent_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("APPSPAWN_RUN_DIR").filter(|p| !p.is_empty()) {
            settings.run_dir = Some(PathBuf::from(path));
        }

        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Effective start timeout.
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(
            self.start_timeout_secs
                .unwrap_or(DEFAULT_START_TIMEOUT_SECS),
        )
    }

    /// Effective spawn timeout.
    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_secs(
            self.spawn_timeout_secs
                .unwrap_or(DEFAULT_SPAWN_TIMEOUT_SECS),
        )
    }

    /// Effective stop grace period.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs.unwrap_or(DEFAULT_STOP_GRACE_SECS))
    }

    /// Effective ping timeout.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms.unwrap_or(DEFAULT_PING_TIMEOUT_MS))
    }

    /// Effective control request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Effective transport.
    pub fn transport(&self) -> Transport {
        self.transport.unwrap_or_default()
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Path for {0} cannot be empty")]
    EmptyPath(&'static str),
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    let timeouts = [
        ("start timeout", settings.start_timeout_secs),
        ("spawn timeout", settings.spawn_timeout_secs),
        ("ping timeout", settings.ping_timeout_ms),
        ("request timeout", settings.request_timeout_secs),
    ];
    for (name, value) in timeouts {
        if value == Some(0) {
            return Err(SettingsError::ZeroTimeout(name));
        }
    }

    if settings
        .agent_path
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(SettingsError::EmptyPath("agent path"));
    }

    if settings
        .run_dir
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(SettingsError::EmptyPath("run directory"));
    }

    Ok(())
}
