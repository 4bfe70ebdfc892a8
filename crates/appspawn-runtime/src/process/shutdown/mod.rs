//! Process termination.
//!
//! Two paths:
//! - `shutdown_child`: for processes we hold a `Child` for (reaps them)
//! - `kill_pid`: for processes known only by PID, such as warm workers
//!   started by a backend or a backend recorded in a pid file
//!
//! Both signal the whole process group an agent leads, so application
//! processes it started do not outlive it.

mod child;
#[cfg(unix)]
mod group;
mod pid;

pub use child::shutdown_child;
#[cfg(unix)]
pub use group::{signal_tree, sweep_group};
pub use pid::{kill_pid, wait_for_exit};
