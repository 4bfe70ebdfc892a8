//! Core domain types and port definitions for appspawn.
//!
//! This crate is infrastructure-free: it describes what a spawned
//! application process looks like ([`ProcessHandle`]), how a spawn is
//! requested ([`SpawnOptions`]), the control-channel wire format
//! ([`protocol`]), and the contracts the runtime implements
//! ([`ports::Spawner`], [`ports::SupervisedServer`]).

pub mod domain;
pub mod error;
pub mod paths;
pub mod ports;
pub mod protocol;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    APP_ENV_VAR, AgentRole, BootKind, DEFAULT_ENVIRONMENT, DEFAULT_STARTUP_FILE, Endpoint,
    EndpointParseError, OwnerPipe, PreloadState, ProcessHandle, ProcessState, SpawnMethod,
    SpawnOptions, StatusReport, Transport, WorkerBoot, ensure_preloaded,
};
pub use error::{
    AlreadyRunning, Diagnostics, OptionsError, ProtocolError, ServerError, SpawnError,
    SpawnerError, StartError,
};
pub use ports::{Spawner, SupervisedServer};
pub use settings::{Settings, SettingsError, validate_settings};

pub use paths::{PathError, pids_dir, run_root, server_key, sockets_dir};
