//! Per-request spawn configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

/// Startup file used when `SpawnOptions::startup_file` is not set.
pub const DEFAULT_STARTUP_FILE: &str = "startup.sh";

/// Environment name used when none is given.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Spawn strategy hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnMethod {
    /// Load the application once in a backend and start workers from the warm state.
    #[default]
    Smart,
    /// Boot every worker from scratch.
    Conservative,
}

impl fmt::Display for SpawnMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smart => write!(f, "smart"),
            Self::Conservative => write!(f, "conservative"),
        }
    }
}

impl FromStr for SpawnMethod {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smart" => Ok(Self::Smart),
            "conservative" => Ok(Self::Conservative),
            other => Err(OptionsError::UnknownSpawnMethod(other.to_string())),
        }
    }
}

/// Immutable configuration for one spawn request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnOptions {
    /// Application root directory.
    pub app_root: PathBuf,
    /// User the application process should run as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Environment name exposed to the application as `APP_ENV`.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Startup file relative to `app_root` (defaults to [`DEFAULT_STARTUP_FILE`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_file: Option<PathBuf>,
    /// Spawn strategy hint.
    #[serde(default)]
    pub spawn_method: SpawnMethod,
    /// Environment variable deltas applied to the worker.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Do not tie the worker's lifetime to an owner pipe.
    #[serde(default)]
    pub detached: bool,
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

impl SpawnOptions {
    /// Create options for an application root with defaults for everything else.
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            user: None,
            environment: default_environment(),
            startup_file: None,
            spawn_method: SpawnMethod::default(),
            env: BTreeMap::new(),
            detached: false,
        }
    }

    /// Set the user to run the application as.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the environment name.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Override the startup file.
    #[must_use]
    pub fn with_startup_file(mut self, startup_file: impl Into<PathBuf>) -> Self {
        self.startup_file = Some(startup_file.into());
        self
    }

    /// Set the spawn method hint.
    #[must_use]
    pub const fn with_spawn_method(mut self, method: SpawnMethod) -> Self {
        self.spawn_method = method;
        self
    }

    /// Add an environment variable delta.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Mark the worker as detached from its owner pipe.
    #[must_use]
    pub const fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// Startup file relative to the application root.
    pub fn startup_file(&self) -> &Path {
        self.startup_file
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_STARTUP_FILE))
    }

    /// Absolute path of the startup file.
    pub fn startup_path(&self) -> PathBuf {
        self.app_root.join(self.startup_file())
    }

    /// Validate the options before any process is created.
    ///
    /// The application root must exist, be a readable directory and contain
    /// the startup file. Environment names and keys must be non-empty.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let root = &self.app_root;
        let meta = fs::metadata(root).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OptionsError::AppRootMissing(root.clone()),
            _ => OptionsError::Unreadable {
                path: root.clone(),
                reason: e.to_string(),
            },
        })?;

        if !meta.is_dir() {
            return Err(OptionsError::NotADirectory(root.clone()));
        }

        fs::read_dir(root).map_err(|e| OptionsError::Unreadable {
            path: root.clone(),
            reason: e.to_string(),
        })?;

        if self.startup_file().is_absolute() {
            return Err(OptionsError::AbsoluteStartupFile(
                self.startup_file().to_path_buf(),
            ));
        }

        let startup = self.startup_path();
        if !startup.is_file() {
            return Err(OptionsError::StartupFileMissing(startup));
        }

        if self.environment.trim().is_empty() {
            return Err(OptionsError::EmptyEnvironment);
        }

        if let Some(bad) = self
            .env
            .keys()
            .find(|k| k.is_empty() || k.contains('=') || k.contains('\0'))
        {
            return Err(OptionsError::InvalidEnvKey(bad.clone()));
        }

        Ok(())
    }
}
