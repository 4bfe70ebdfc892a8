//! Domain types shared by supervisors, spawners and the agent binary.

mod endpoint;
mod handle;
mod options;
mod preload;
mod status;

pub use endpoint::{Endpoint, EndpointParseError, Transport};
pub use handle::{OwnerPipe, ProcessHandle, ProcessState};
pub use options::{DEFAULT_ENVIRONMENT, DEFAULT_STARTUP_FILE, SpawnMethod, SpawnOptions};
pub use preload::{APP_ENV_VAR, PreloadState, WorkerBoot, ensure_preloaded};
pub use status::{AgentRole, BootKind, StatusReport};
