//! Subcommands and their arguments.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use appspawn_core::{DEFAULT_ENVIRONMENT, Endpoint, SpawnMethod, SpawnOptions};

use crate::edition::{EditionOnlyOptions, EditionPolicy};

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a preloading backend for an application and leave it running
    Start(StartArgs),

    /// Stop the backend recorded for an application
    Stop {
        /// Application root directory
        #[arg(long, default_value = ".")]
        app_root: PathBuf,
    },

    /// Show the status of the backend recorded for an application
    Status {
        /// Application root directory
        #[arg(long, default_value = ".")]
        app_root: PathBuf,
    },

    /// Ping any appspawn endpoint
    Ping {
        /// Endpoint, e.g. unix:/run/appspawn/sockets/worker-1.sock or tcp://127.0.0.1:4100
        endpoint: Endpoint,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Spawn one application worker and print its handle as JSON
    Spawn(SpawnArgs),

    /// Stop a worker, escalating to signals if it does not exit
    StopWorker {
        /// Endpoint the worker answers on
        endpoint: Endpoint,

        /// PID the worker reported
        #[arg(long)]
        pid: u32,
    },
}

/// Options naming the application to load.
#[derive(Args, Debug, Clone)]
pub struct AppArgs {
    /// Application root directory
    #[arg(long, default_value = ".")]
    pub app_root: PathBuf,

    /// Environment name passed to the application as APP_ENV
    #[arg(short, long, default_value = DEFAULT_ENVIRONMENT)]
    pub environment: String,

    /// Startup file, relative to the application root
    #[arg(long)]
    pub startup_file: Option<PathBuf>,

    /// Run the application as this user (requires root)
    #[arg(long)]
    pub user: Option<String>,
}

impl AppArgs {
    /// Spawn options for this application.
    pub fn to_options(&self) -> SpawnOptions {
        let mut options =
            SpawnOptions::new(&self.app_root).with_environment(self.environment.clone());
        if let Some(startup_file) = &self.startup_file {
            options = options.with_startup_file(startup_file);
        }
        if let Some(user) = &self.user {
            options = options.with_user(user.clone());
        }
        options
    }
}

/// Arguments to `start`.
#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    #[command(flatten)]
    pub app: AppArgs,

    /// Seconds the backend may take to load the application
    #[arg(long)]
    pub start_timeout: Option<u64>,

    #[command(flatten)]
    pub edition: EditionOnlyOptions,

    /// What to do with options this edition does not support
    #[arg(long, value_enum, default_value_t = EditionPolicy::Reject)]
    pub edition_options: EditionPolicy,
}

/// Arguments to `spawn`.
#[derive(Args, Debug, Clone)]
pub struct SpawnArgs {
    #[command(flatten)]
    pub app: AppArgs,

    /// Boot the worker from scratch instead of from a preloaded backend
    #[arg(long)]
    pub conservative: bool,

    /// Extra environment for the worker, as KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Leave the worker running and exit immediately
    #[arg(long)]
    pub detach: bool,
}

impl SpawnArgs {
    pub fn to_options(&self) -> SpawnOptions {
        let method = if self.conservative {
            SpawnMethod::Conservative
        } else {
            SpawnMethod::Smart
        };
        let mut options = self
            .app
            .to_options()
            .with_spawn_method(method)
            .detached(self.detach);
        for (key, value) in &self.env {
            options = options.with_env(key.clone(), value.clone());
        }
        options
    }
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("missing variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
