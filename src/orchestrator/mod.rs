//! Session orchestration.
//!
//! Covers external program spawning, output draining, the per-session
//! runner lifecycle, and the registry that maps sessions to runners.

pub mod codec;
pub mod drain;
pub mod registry;
pub mod runner;
pub mod spawner;

pub use registry::SessionRegistry;
pub use runner::Runner;
pub use spawner::{ProgramSpec, SpawnConfig};
