//! Ping command handler.

use std::time::Duration;

use appspawn_core::Endpoint;
use appspawn_runtime::ControlChannel;

use crate::error::CliError;

/// Ping `endpoint` and print which PID answered.
pub async fn execute(endpoint: &Endpoint, timeout: Duration) -> Result<(), CliError> {
    let pid = ControlChannel::new(endpoint.clone(), timeout).ping().await?;
    println!("pong from PID {pid} on {endpoint}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let endpoint = Endpoint::Unix(tmp.path().join("nobody.sock"));
        let err = execute(&endpoint, Duration::from_millis(200)).await.unwrap_err();
        assert_eq!(err.exit_code(), 69);
    }
}
