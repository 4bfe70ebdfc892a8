//! Start command handler.

use appspawn_core::{Settings, validate_settings};
use appspawn_runtime::PreloadingSpawnServer;

use crate::commands::StartArgs;
use crate::error::CliError;

/// Start a preloading backend and leave it running after this process exits.
///
/// A backend that is already running for the application is an error.
pub async fn execute(settings: &Settings, args: &StartArgs) -> Result<(), CliError> {
    args.edition.enforce(args.edition_options)?;

    let mut settings = settings.clone();
    if let Some(secs) = args.start_timeout {
        settings.start_timeout_secs = Some(secs);
    }
    validate_settings(&settings)?;

    let server = PreloadingSpawnServer::with_log_file(args.app.to_options(), &settings)?;
    server.start().await?;

    let endpoint = server.server().endpoint().await;
    match (server.detach().await, endpoint) {
        (Some(pid), Some(endpoint)) => {
            println!("appspawn backend started on PID {pid}, listening on {endpoint}.");
        }
        _ => println!("appspawn backend started."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Cli;
    use crate::commands::Commands;
    use clap::Parser;

    #[tokio::test]
    async fn edition_only_option_is_rejected_before_anything_starts() {
        let cli = Cli::parse_from([
            "appspawn",
            "start",
            "--app-root",
            "/nonexistent/appspawn/app",
            "--rolling-restarts",
        ]);
        let Commands::Start(args) = cli.command else {
            panic!("expected start");
        };
        let err = execute(&Settings::with_defaults(), &args).await.unwrap_err();
        assert!(matches!(err, CliError::EditionOnly { option: "--rolling-restarts" }));
    }

    #[tokio::test]
    async fn ignored_edition_option_reaches_option_validation() {
        let cli = Cli::parse_from([
            "appspawn",
            "start",
            "--app-root",
            "/nonexistent/appspawn/app",
            "--thread-count",
            "8",
            "--edition-options",
            "ignore",
        ]);
        let Commands::Start(args) = cli.command else {
            panic!("expected start");
        };
        let err = execute(&Settings::with_defaults(), &args).await.unwrap_err();
        assert!(matches!(err, CliError::Arguments(_)), "{err:?}");
    }
}
