#![forbid(unsafe_code)]

//! Session supervisor for interactive user studies.
//!
//! Each browser session drives its own external decision program over
//! line-oriented stdio. The server relays the program's output, forwards
//! integer choices to it, and records study feedback in a durable
//! append-only log.

pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
