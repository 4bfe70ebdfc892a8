//! Operator CLI for appspawn.
//!
//! `main.rs` is the composition root; everything it dispatches to lives
//! here so handlers can be tested without a terminal.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tempfile as _;

// Used only by the binary.
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod backend;
pub mod commands;
pub mod config;
pub mod edition;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use commands::Commands;
pub use config::resolve_settings;
pub use edition::{EditionOnlyOptions, EditionPolicy};
pub use error::CliError;
pub use parser::Cli;
