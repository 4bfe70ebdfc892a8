//! Path utilities for appspawn run-time state.
//!
//! Pid files and unix socket files live under one run directory:
//! ```text
//! <run root>/pids/<server key>.pid
//! <run root>/sockets/<name>.sock
//! ```
//!
//! # Design
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - Resolution order is explicit settings, then platform directories

mod error;
mod run;

pub use error::PathError;
pub use run::{pids_dir, run_root, server_key, sockets_dir};
