//! Shared state handed to every request handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::orchestrator::{SessionRegistry, SpawnConfig};
use crate::persistence::{FeedbackStore, ScratchArea};

/// Application state shared across handlers.
#[derive(Debug)]
pub struct AppState {
    /// Global configuration.
    pub config: GlobalConfig,
    /// Resolved data directory.
    pub data_dir: PathBuf,
    /// Session runners.
    pub registry: SessionRegistry,
    /// Feedback log.
    pub store: Arc<FeedbackStore>,
    /// Per-session interaction artifacts.
    pub scratch: ScratchArea,
}

impl AppState {
    /// Wire the registry, store, and scratch area for `data_dir`.
    #[must_use]
    pub fn new(config: GlobalConfig, data_dir: &Path) -> Self {
        let spawn = Arc::new(SpawnConfig::from_config(&config, data_dir));
        Self {
            registry: SessionRegistry::new(spawn),
            store: Arc::new(FeedbackStore::in_dir(data_dir, &config.feedback_file)),
            scratch: ScratchArea::in_data_dir(data_dir),
            data_dir: data_dir.to_path_buf(),
            config,
        }
    }
}
