//! Child process plumbing shared by supervisors, spawners and the agent.

mod logs;
mod shutdown;
mod stream;

pub use logs::{DIAGNOSTIC_TAIL_LINES, DiagnosticsBuffer, MAX_DIAGNOSTIC_LINES};
pub use shutdown::{kill_pid, shutdown_child, wait_for_exit};
#[cfg(unix)]
pub use shutdown::{signal_tree, sweep_group};
pub use stream::spawn_stream_reader;
