//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Supervised program settings.
///
/// The dataset reference is appended after `args` as the only per-request
/// argument.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ProgramConfig {
    /// Primary executable (e.g. the compiled study binary).
    pub command: String,
    /// Fixed arguments placed before the dataset reference.
    pub args: Vec<String>,
    /// Executable tried when the primary cannot be spawned.
    pub fallback_command: Option<String>,
    /// Fixed arguments for the fallback executable.
    pub fallback_args: Vec<String>,
    /// Working directory for spawned processes; inherits the server's when unset.
    pub working_dir: Option<PathBuf>,
    /// Dataset used when a start request does not name an allowed one.
    pub default_dataset: String,
    /// Datasets a client may select explicitly.
    pub datasets: Vec<String>,
    /// Pause after force-stopping a superseded process before respawning.
    pub restart_grace_ms: u64,
    /// Upper bound for a single write to the process's stdin.
    pub input_timeout_ms: u64,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            command: "./run_web".into(),
            args: Vec::new(),
            fallback_command: Some("python3".into()),
            fallback_args: vec!["mock_algorithm.py".into()],
            working_dir: None,
            default_dataset: "datasets/car.txt".into(),
            datasets: Vec::new(),
            restart_grace_ms: 200,
            input_timeout_ms: 2000,
        }
    }
}

impl ProgramConfig {
    /// Grace delay observed between stopping an old process and spawning its replacement.
    #[must_use]
    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    /// Bound applied to each stdin write.
    #[must_use]
    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }

    /// Pick the dataset for a start request.
    ///
    /// A requested dataset is honoured only when it is on the allow-list;
    /// anything else falls back to `default_dataset`.
    #[must_use]
    pub fn select_dataset(&self, requested: Option<&str>) -> &str {
        match requested {
            Some(name) => self
                .datasets
                .iter()
                .find(|allowed| allowed.as_str() == name)
                .map_or(self.default_dataset.as_str(), String::as_str),
            None => self.default_dataset.as_str(),
        }
    }
}

/// Inclusive bounds for submitted rating values.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct RatingBounds {
    /// Lowest accepted rating.
    pub min: i64,
    /// Highest accepted rating.
    pub max: i64,
}

impl Default for RatingBounds {
    fn default() -> Self {
        Self { min: 1, max: 10 }
    }
}

impl RatingBounds {
    /// Whether `value` lies within the bounds.
    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

fn default_http_host() -> String {
    "0.0.0.0".into()
}

fn default_http_port() -> u16 {
    5001
}

fn default_feedback_file() -> String {
    "user_feedback.json".into()
}

fn default_region_header() -> String {
    "x-client-region".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Interface the HTTP listener binds to.
    #[serde(default = "default_http_host")]
    pub http_host: String,
    /// HTTP listener port; `PORT` overrides it.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Explicit persistent directory, tried before any platform volume.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// File name of the feedback log inside the data directory.
    #[serde(default = "default_feedback_file")]
    pub feedback_file: String,
    /// Request header carrying the client's region hint.
    #[serde(default = "default_region_header")]
    pub region_header: String,
    /// Supervised program settings.
    #[serde(default)]
    pub program: ProgramConfig,
    /// Accepted rating range.
    #[serde(default)]
    pub ratings: RatingBounds,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            data_dir: None,
            feedback_file: default_feedback_file(),
            region_header: default_region_header(),
            program: ProgramConfig::default(),
            ratings: RatingBounds::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PORT` from the environment, ignoring unparseable values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = env::var("PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.http_port = port,
                Err(err) => warn!(value = %raw, %err, "ignoring invalid PORT override"),
            }
        }
    }

    /// `host:port` string for the HTTP listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.program.command.trim().is_empty() {
            return Err(AppError::Config("program.command must not be empty".into()));
        }

        if self.ratings.min > self.ratings.max {
            return Err(AppError::Config(format!(
                "ratings.min ({}) must not exceed ratings.max ({})",
                self.ratings.min, self.ratings.max
            )));
        }

        if self.program.input_timeout_ms == 0 {
            return Err(AppError::Config(
                "program.input_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.feedback_file.trim().is_empty() {
            return Err(AppError::Config("feedback_file must not be empty".into()));
        }

        Ok(())
    }
}
