//! Command handlers.
//!
//! Handlers are thin: build options from arguments, call the runtime,
//! print the outcome. Failures are returned as [`CliError`](crate::CliError)
//! so `main` can pick the exit code.

pub mod ping;
pub mod spawn;
pub mod start;
pub mod status;
pub mod stop;
pub mod stop_worker;
