//! Supervision contract for out-of-process servers.

use async_trait::async_trait;

use crate::error::ServerError;

/// Lifecycle operations consumed by operator tooling.
#[async_trait]
pub trait SupervisedServer: Send + Sync {
    /// Start the server and wait until it proves readiness.
    async fn start(&self) -> Result<(), ServerError>;

    /// Stop the server. Stopping a stopped server is a no-op.
    async fn stop(&self) -> Result<(), ServerError>;

    /// Liveness check. `Ok(false)` when unreachable.
    async fn ping(&self) -> Result<bool, ServerError>;

    /// In-memory view of whether the server is running. Performs no I/O.
    fn is_started(&self) -> bool;
}
