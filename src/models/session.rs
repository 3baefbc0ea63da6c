//! Session key, runner lifecycle state, and status snapshot.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Longest key that is still used as a scratch-file stem.
const MAX_FILE_STEM_LEN: usize = 128;

/// Opaque client-supplied session identifier.
///
/// The server never generates or interprets keys; it only refuses empty ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wrap a client-supplied key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the key is empty or whitespace.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(AppError::Validation("session_id must not be empty".into()));
        }
        Ok(Self(raw))
    }

    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key can be used verbatim as a file stem.
    ///
    /// Only ASCII alphanumerics, `-` and `_` qualify, which rules out path
    /// separators and `..` traversal.
    #[must_use]
    pub fn is_safe_file_stem(&self) -> bool {
        self.0.len() <= MAX_FILE_STEM_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a session runner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    /// No process. Initial state.
    Idle,
    /// External program is being located and spawned.
    Launching,
    /// Process running with stdio open and a drain worker attached.
    Active,
    /// Termination requested.
    Terminating,
    /// Process gone; behaves like `Idle` for future transitions.
    Terminated,
}

impl RunnerState {
    /// Determine whether a lifecycle transition is permitted.
    ///
    /// `Active → Launching` is the restart path: the old process is stopped
    /// inside the same start call before the new one is spawned.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Terminated | Self::Active, Self::Launching)
                | (Self::Launching, Self::Active | Self::Idle)
                | (Self::Active, Self::Terminating | Self::Terminated)
                | (Self::Terminating, Self::Terminated)
        )
    }

    /// Whether the runner currently owns a live process.
    #[must_use]
    pub fn is_running(self) -> bool {
        self == Self::Active
    }
}

/// Point-in-time copy of a runner's liveness and buffered output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerStatus {
    /// Whether a process is active.
    pub running: bool,
    /// Output lines buffered since the last start.
    pub output: Vec<String>,
}
