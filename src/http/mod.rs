//! HTTP boundary: routing, request decoding, and error mapping.
//!
//! Handlers stay thin. They parse and validate client input, then delegate
//! to the session registry or the feedback store.

pub mod algorithm;
pub mod error;
pub mod feedback;
pub mod origin;
pub mod server;
pub mod state;

pub use server::{router, serve};
pub use state::AppState;
