//! Stop-worker command handler.

use appspawn_core::{Endpoint, ProcessHandle, Settings, SpawnMethod};
use appspawn_runtime::{WorkerStop, resolve_agent_path, stop_worker};

use crate::error::CliError;

/// Stop the worker `pid` answering on `endpoint`.
pub async fn execute(settings: &Settings, endpoint: Endpoint, pid: u32) -> Result<(), CliError> {
    let handle = ProcessHandle::new(pid, endpoint, SpawnMethod::default());
    let agent = resolve_agent_path(settings).ok();
    let outcome = stop_worker(
        &handle,
        agent.as_deref(),
        settings.stop_grace(),
        settings.ping_timeout(),
    )
    .await?;
    report_stop(pid, outcome)
}

/// Print the outcome of stopping worker `pid`.
///
/// # Errors
///
/// [`CliError::Process`] when the PID belongs to another process.
pub fn report_stop(pid: u32, outcome: WorkerStop) -> Result<(), CliError> {
    match outcome {
        WorkerStop::Stopped => println!("Stopped worker PID {pid}."),
        WorkerStop::AlreadyGone => println!("Worker PID {pid} is not running."),
        WorkerStop::NotOurs => {
            return Err(CliError::Process(format!(
                "PID {pid} is not an appspawn worker; it was not signalled"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_pid_is_an_error() {
        assert!(report_stop(1, WorkerStop::Stopped).is_ok());
        assert!(report_stop(1, WorkerStop::AlreadyGone).is_ok());
        let err = report_stop(1, WorkerStop::NotOurs).unwrap_err();
        assert_eq!(err.exit_code(), 71);
    }

    #[tokio::test]
    async fn missing_worker_is_already_gone() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        let settings = Settings {
            run_dir: Some(tmp.path().to_path_buf()),
            ..Settings::with_defaults()
        };
        execute(&settings, Endpoint::Unix(tmp.path().join("w.sock")), pid)
            .await
            .unwrap();
    }
}
