//! Loading an application: running its startup file once.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Instant;

use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info};

use appspawn_core::{APP_ENV_VAR, PreloadState, SpawnOptions};

/// The application's startup file failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub message: String,
    /// What the application printed, verbatim.
    pub app_output: Option<String>,
}

impl LoadFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            app_output: None,
        }
    }
}

/// Run the startup file of `options` and collect its exports.
///
/// The file is run with `sh` inside the application root, with `APP_ENV`
/// and the request's environment deltas set. A non-zero exit is a
/// failure carrying stderr followed by stdout.
pub async fn load_application(options: &SpawnOptions) -> Result<PreloadState, LoadFailure> {
    let started = Instant::now();
    let app_root = options.app_root.canonicalize().map_err(|e| {
        LoadFailure::new(format!(
            "cannot resolve application root {}: {e}",
            options.app_root.display()
        ))
    })?;
    let startup_file = options.startup_file().to_path_buf();

    debug!(app_root = %app_root.display(), startup_file = %startup_file.display(), "Loading application");
    let output = Command::new("sh")
        .arg(&startup_file)
        .current_dir(&app_root)
        .env(APP_ENV_VAR, &options.environment)
        .envs(&options.env)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| LoadFailure::new(format!("cannot run {}: {e}", startup_file.display())))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(LoadFailure {
            message: format!(
                "application failed to load: {} exited with {}",
                startup_file.display(),
                output.status
            ),
            app_output: Some(format!("{stderr}{stdout}")),
        });
    }

    let exports = parse_exports(&stdout);
    let boot_millis = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        app_root = %app_root.display(),
        exports = exports.len(),
        boot_millis,
        "Application loaded"
    );

    Ok(PreloadState {
        app_root,
        startup_file,
        environment: options.environment.clone(),
        exports,
        loaded_at: Utc::now(),
        boot_millis,
    })
}

/// Collect `KEY=VALUE` lines (optionally prefixed with `export `).
///
/// Surrounding single or double quotes are stripped from values. Lines
/// that are not assignments are application chatter and only logged.
pub fn parse_exports(stdout: &str) -> BTreeMap<String, String> {
    let mut exports = BTreeMap::new();
    for line in stdout.lines() {
        let trimmed = line.trim();
        let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim_start();
        match assignment.split_once('=') {
            Some((key, value)) if is_valid_key(key) => {
                exports.insert(key.to_string(), unquote(value).to_string());
            }
            _ if trimmed.is_empty() => {}
            _ => debug!(target: "app", "{}", line),
        }
    }
    exports
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
