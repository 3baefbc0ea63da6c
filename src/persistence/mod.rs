//! Durable state: data directory resolution, the feedback log, and
//! per-session scratch artifacts.

pub mod data_dir;
pub mod feedback_store;
pub mod log_format;
pub mod scratch;

pub use feedback_store::{FeedbackStore, MergeOutcome};
pub use scratch::ScratchArea;
