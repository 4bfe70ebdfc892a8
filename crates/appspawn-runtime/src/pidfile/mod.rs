//! PID files for supervised servers.
//!
//! A supervisor records the server it started so a different process
//! (a later `appspawn` invocation, or a restarted supervisor) can find it.
//!
//! # Safety guarantees
//! - Atomic writes via temp file + rename
//! - Liveness checks treat zombies as dead
//! - A PID is only signalled after it is confirmed to be an agent process

mod io;
mod verify;

pub use io::{ServerRecord, delete_pidfile, read_pidfile, write_pidfile};
pub use verify::{is_agent_process, is_live_process, pid_exists};
