//! Spawner trait definition.

use async_trait::async_trait;

use crate::domain::{ProcessHandle, SpawnOptions};
use crate::error::SpawnerError;

/// Produces ready, addressable application workers.
///
/// Implemented by the preloading (smart) and conservative strategies.
/// Implementations validate `options` before creating any process and
/// never return a handle to a process that failed its readiness check.
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Spawn one worker for the application described by `options`.
    ///
    /// # Errors
    ///
    /// - [`SpawnerError::InvalidOptions`] before any process is created
    /// - [`SpawnerError::Spawn`] when the worker fails to start or handshake
    /// - [`SpawnerError::BackendUnavailable`] when a preloading backend is gone
    /// - [`SpawnerError::Protocol`] on malformed control traffic
    async fn spawn_application(&self, options: &SpawnOptions)
    -> Result<ProcessHandle, SpawnerError>;
}
