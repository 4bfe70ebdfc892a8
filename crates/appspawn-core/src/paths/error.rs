//! Path-related error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during path resolution and directory operations.
#[derive(Debug, Error)]
pub enum PathError {
    /// Could not determine any base directory for run-time state.
    #[error("Cannot determine a directory for run-time state")]
    NoRunDir,

    /// A path was expected to be a directory but was not.
    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),

    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Failed to resolve the application root.
    #[error("Cannot resolve application root {path}: {reason}")]
    Canonicalize { path: PathBuf, reason: String },
}
