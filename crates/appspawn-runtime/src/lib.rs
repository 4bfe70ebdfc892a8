//! Process supervision and spawn strategies for appspawn.
//!
//! - [`AbstractServer`]: start/stop/ping/restart of one agent process
//! - [`PreloadingSpawnServer`]: smart spawning from a preloaded backend
//! - [`ConservativeSpawner`]: cold boot per worker
//! - [`select_spawner`]: strategy selection from the `spawn_method` hint
//! - [`agent`]: the code behind the `appspawn-agent` binary

#![deny(unsafe_code)]

pub mod agent;
mod channel;
mod conservative;
mod error;
mod frame;
mod handshake;
mod launch;
pub mod pidfile;
mod preloading;
pub mod process;
mod selection;
mod server;
mod workers;

pub use channel::{ChannelError, ControlChannel};
pub use conservative::ConservativeSpawner;
pub use error::SetupError;
pub use launch::{AGENT_BINARY, AGENT_ENV_VAR, resolve_agent_path};
pub use preloading::{BackendLocation, PreloadingSpawnServer, spawn_reply_deadline};
pub use selection::{SpawnStrategy, select_spawner};
pub use server::{AbstractServer, Liveness, RecordedStop, ServerConfig, ServerProgram};
pub use workers::{WorkerStop, stop_worker};
