//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use appspawn_core::Transport;

use crate::commands::Commands;

/// Command-line interface for the appspawn spawning engine.
///
/// Global options mirror the `APPSPAWN_*` environment variables and win
/// over them when both are given.
#[derive(Parser, Debug)]
#[command(name = "appspawn")]
#[command(about = "Start, inspect and stop preloaded application backends and workers")]
#[command(version)]
pub struct Cli {
    /// Directory for pid files and sockets
    #[arg(long, global = true, env = "APPSPAWN_RUN_DIR")]
    pub run_dir: Option<PathBuf>,

    /// Path to the appspawn-agent binary
    #[arg(long, global = true, env = "APPSPAWN_AGENT")]
    pub agent: Option<PathBuf>,

    /// Control channel transport: unix or tcp
    #[arg(long, global = true, env = "APPSPAWN_TRANSPORT")]
    pub transport: Option<Transport>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "appspawn",
            "--verbose",
            "--run-dir",
            "/tmp/appspawn",
            "--transport",
            "tcp",
            "ping",
            "unix:/tmp/a.sock",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.run_dir, Some(PathBuf::from("/tmp/appspawn")));
        assert_eq!(cli.transport, Some(Transport::Tcp));
    }

    #[test]
    fn test_bad_transport_is_rejected() {
        let result = Cli::try_parse_from(["appspawn", "--transport", "udp", "ping", "unix:/a.sock"]);
        assert!(result.is_err());
    }
}
