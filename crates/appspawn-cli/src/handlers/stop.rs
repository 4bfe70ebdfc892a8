//! Stop command handler.

use std::path::Path;

use appspawn_core::Settings;
use appspawn_runtime::{AbstractServer, BackendLocation, RecordedStop, resolve_agent_path};

use crate::error::CliError;

/// Stop the backend recorded for `app_root`.
///
/// Asks the backend to shut down, then escalates to SIGTERM and SIGKILL,
/// but only when the recorded PID is verified to be an agent process.
pub async fn execute(settings: &Settings, app_root: &Path) -> Result<(), CliError> {
    let location = BackendLocation::for_app(app_root, settings)?;
    let agent = resolve_agent_path(settings)?;

    let outcome = AbstractServer::stop_recorded(
        &location.pidfile,
        &agent,
        settings.stop_grace(),
        settings.ping_timeout(),
    )
    .await?;
    println!("{}", stop_message(outcome));
    Ok(())
}

fn stop_message(outcome: RecordedStop) -> String {
    match outcome {
        RecordedStop::Stopped(pid) => format!("Stopped appspawn backend (PID {pid})."),
        RecordedStop::NotRunning => "appspawn backend is not running.".to_string(),
        RecordedStop::Stale(pid) => {
            format!("Removed stale pid file; PID {pid} is not an appspawn backend.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_record_message_names_pid() {
        assert_eq!(
            stop_message(RecordedStop::Stale(77)),
            "Removed stale pid file; PID 77 is not an appspawn backend."
        );
        assert_eq!(
            stop_message(RecordedStop::NotRunning),
            "appspawn backend is not running."
        );
    }
}
