//! Settings for one CLI invocation.

use appspawn_core::{Settings, validate_settings};

use crate::error::CliError;
use crate::parser::Cli;

/// `APPSPAWN_*` environment variables overlaid with global flags.
pub fn resolve_settings(cli: &Cli) -> Result<Settings, CliError> {
    let mut settings = Settings::from_env()?;
    apply_flags(&mut settings, cli);
    validate_settings(&settings)?;
    Ok(settings)
}

fn apply_flags(settings: &mut Settings, cli: &Cli) {
    if let Some(dir) = &cli.run_dir {
        settings.run_dir = Some(dir.clone());
    }
    if let Some(agent) = &cli.agent {
        settings.agent_path = Some(agent.clone());
    }
    if let Some(transport) = cli.transport {
        settings.transport = Some(transport);
    }
}
