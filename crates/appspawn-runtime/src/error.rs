//! Errors raised while assembling a supervisor or spawner.

use thiserror::Error;

use appspawn_core::{OptionsError, PathError, SettingsError};

/// Configuration problems detected before any process exists.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("agent binary not found: {0}")]
    AgentNotFound(String),
}
