//! Warm application state and worker boot payloads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::options::SpawnOptions;
use crate::error::OptionsError;

/// Environment variable carrying the environment name into the application.
pub const APP_ENV_VAR: &str = "APP_ENV";

/// Result of loading an application once.
///
/// Held in memory by the preloading backend for its whole lifetime and
/// handed to every worker it starts, so workers never repeat the load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadState {
    /// Canonical application root.
    pub app_root: PathBuf,
    /// Startup file that produced this state.
    pub startup_file: PathBuf,
    /// Environment name the application was loaded for.
    pub environment: String,
    /// Settings exported by the startup file.
    pub exports: BTreeMap<String, String>,
    /// When the load completed.
    pub loaded_at: DateTime<Utc>,
    /// How long the load took.
    pub boot_millis: u64,
}

/// Check that `options` ask for the application a backend preloaded.
///
/// A warm worker cannot change what was loaded, so the canonical root, the
/// startup file and the environment name must all match. Only `env`
/// deltas, the user and detachment may differ per request.
pub fn ensure_preloaded(
    app_root: &Path,
    startup_file: &Path,
    environment: &str,
    options: &SpawnOptions,
) -> Result<(), OptionsError> {
    let requested = options
        .app_root
        .canonicalize()
        .map_err(|e| OptionsError::Unreadable {
            path: options.app_root.clone(),
            reason: e.to_string(),
        })?;
    if requested != app_root {
        return Err(OptionsError::AppRootMismatch {
            preloaded: app_root.to_path_buf(),
            requested,
        });
    }
    if options.startup_file() != startup_file {
        return Err(OptionsError::StartupFileMismatch {
            preloaded: startup_file.to_path_buf(),
            requested: options.startup_file().to_path_buf(),
        });
    }
    if options.environment != environment {
        return Err(OptionsError::EnvironmentMismatch {
            preloaded: environment.to_string(),
            requested: options.environment.clone(),
        });
    }
    Ok(())
}

impl PreloadState {
    /// See [`ensure_preloaded`].
    pub fn accepts(&self, options: &SpawnOptions) -> Result<(), OptionsError> {
        ensure_preloaded(&self.app_root, &self.startup_file, &self.environment, options)
    }

    /// Environment for a worker started from this state.
    ///
    /// Exports come first, then `APP_ENV`, then the request's own deltas,
    /// so a per-request override always wins.
    pub fn worker_environment(&self, options: &SpawnOptions) -> BTreeMap<String, String> {
        let mut env = self.exports.clone();
        env.insert(APP_ENV_VAR.to_string(), self.environment.clone());
        env.extend(options.env.clone());
        env
    }
}

/// First line a worker reads from stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "boot", rename_all = "snake_case")]
pub enum WorkerBoot {
    /// Load the application from scratch.
    Cold { options: SpawnOptions },
    /// Start from a backend's preloaded state.
    Warm {
        state: PreloadState,
        options: SpawnOptions,
    },
}

impl WorkerBoot {
    /// Options of this boot.
    pub const fn options(&self) -> &SpawnOptions {
        match self {
            Self::Cold { options } | Self::Warm { options, .. } => options,
        }
    }

    /// Whether the worker should exit when its stdin reaches EOF.
    ///
    /// Only cold workers have an owner holding their stdin; warm workers
    /// are started by a backend that closes stdin after the boot line.
    pub const fn watches_owner_pipe(&self) -> bool {
        match self {
            Self::Cold { options } => !options.detached,
            Self::Warm { .. } => false,
        }
    }
}
