//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Every variant is session-local: none of them is allowed to take down the
/// serving process or leak into another session's state.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The external program could not be started.
    Spawn(String),
    /// Input or status requested for a session with no live runner.
    NoActiveSession(String),
    /// A start request raced with a stop and the runner was retired.
    SessionClosed(String),
    /// Client-supplied input or rating failed a syntactic or range check.
    Validation(String),
    /// Transient I/O failure (process stdin, feedback log, scratch files).
    Io(String),
    /// Feedback store encode/decode failure.
    Store(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::NoActiveSession(msg) => write!(f, "no active session: {msg}"),
            Self::SessionClosed(msg) => write!(f, "session closed: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Store(msg) => write!(f, "store: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(err.to_string())
    }
}
