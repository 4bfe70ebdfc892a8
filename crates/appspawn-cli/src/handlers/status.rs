//! Status command handler.

use std::path::Path;

use appspawn_core::{AlreadyRunning, Settings};
use appspawn_runtime::pidfile::read_pidfile;
use appspawn_runtime::{AbstractServer, BackendLocation, ControlChannel};

use crate::error::CliError;
use crate::presentation::format_status;

/// Print the status report of the backend recorded for `app_root`.
///
/// # Errors
///
/// [`CliError::NotRunning`] when no backend answers for the application.
pub async fn execute(settings: &Settings, app_root: &Path) -> Result<(), CliError> {
    let location = BackendLocation::for_app(app_root, settings)?;
    let running = AbstractServer::find_existing(
        Some(&location.pidfile),
        &location.endpoint,
        settings.ping_timeout(),
    )
    .await
    .ok_or(CliError::NotRunning)?;

    let endpoint = read_pidfile(&location.pidfile)
        .map(|record| record.endpoint)
        .unwrap_or(location.endpoint);

    if running == AlreadyRunning::PidUnknown {
        println!(
            "appspawn backend is running on {endpoint} (PID unknown) but does not answer status requests."
        );
        return Ok(());
    }

    let report = ControlChannel::new(endpoint.clone(), settings.request_timeout())
        .status()
        .await?;
    print!("{}", format_status(&report, &endpoint));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn nothing_recorded_is_not_running() {
        let run_dir = TempDir::new().unwrap();
        let app = TempDir::new().unwrap();
        let settings = Settings {
            run_dir: Some(run_dir.path().to_path_buf()),
            ..Settings::with_defaults()
        };
        let err = execute(&settings, app.path()).await.unwrap_err();
        assert!(matches!(err, CliError::NotRunning));
        assert_eq!(err.exit_code(), 3);
    }
}
