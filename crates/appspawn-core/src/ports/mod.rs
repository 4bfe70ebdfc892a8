//! Port definitions (trait abstractions) implemented by the runtime.
//!
//! # Design Rules
//!
//! - No process or socket implementation details in signatures
//! - Both spawn strategies expose the same [`Spawner`] contract, so a
//!   dispatcher never needs to know which one is active

mod spawner;
mod supervised;

pub use spawner::Spawner;
pub use supervised::SupervisedServer;
