//! Per-session interaction scratch artifacts.
//!
//! The supervised program records interaction events for its session under
//! `<data_dir>/sessions/<session_id>.json`. The server reads the artifact when
//! feedback is submitted and folds it into the record. The artifact is deleted
//! only after that record has been written, so a failed write leaves it in
//! place for the next attempt.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use super::log_format;
use crate::models::SessionKey;

/// Directory name for scratch artifacts inside the data directory.
pub const SESSIONS_DIR: &str = "sessions";

/// Scratch artifact directory.
#[derive(Debug, Clone)]
pub struct ScratchArea {
    dir: PathBuf,
}

impl ScratchArea {
    /// Scratch area under `data_dir`.
    #[must_use]
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(SESSIONS_DIR),
        }
    }

    /// Artifact path for `session`, or `None` when the key is not a safe file stem.
    #[must_use]
    pub fn path_for(&self, session: &SessionKey) -> Option<PathBuf> {
        session
            .is_safe_file_stem()
            .then(|| self.dir.join(format!("{}.json", session.as_str())))
    }

    /// Read the session's artifact without removing it.
    ///
    /// Returns `None` when there is no artifact, the key cannot name one, or
    /// the artifact held no parseable events. A missing artifact is normal.
    #[must_use]
    pub fn read_interactions(&self, session: &SessionKey) -> Option<Vec<Value>> {
        let path = self.path_for(session)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read interaction artifact");
                return None;
            }
        };

        let events = log_format::parse(&String::from_utf8_lossy(&bytes)).into_values();
        debug!(session_id = %session, events = events.len(), "collected interaction artifact");
        (!events.is_empty()).then_some(events)
    }

    /// Delete the session's artifact once its events are durably recorded.
    pub fn discard(&self, session: &SessionKey) {
        let Some(path) = self.path_for(session) else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => debug!(session_id = %session, "deleted interaction artifact"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to delete interaction artifact");
            }
        }
    }
}
