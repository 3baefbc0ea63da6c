//! Writable data directory resolution.
//!
//! Candidates are tried in order: explicit configuration, `DATA_DIR`,
//! `RAILWAY_VOLUME_MOUNT_PATH`, then the conventional `/data` volume. A
//! candidate is accepted only after a real probe file has been written and
//! removed inside it. When nothing qualifies the current working directory
//! is returned, so resolution never fails.

use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Environment variable naming an operator-chosen data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable set by the hosting platform for a mounted volume.
pub const VOLUME_MOUNT_ENV: &str = "RAILWAY_VOLUME_MOUNT_PATH";

/// Conventional persistent volume location.
pub const DEFAULT_VOLUME: &str = "/data";

/// Build the ordered candidate list from configuration and environment.
#[must_use]
pub fn candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut list = Vec::new();
    if let Some(path) = configured {
        list.push(path.to_path_buf());
    }
    for key in [DATA_DIR_ENV, VOLUME_MOUNT_ENV] {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                list.push(PathBuf::from(trimmed));
            }
        }
    }
    list.push(PathBuf::from(DEFAULT_VOLUME));
    list
}

/// Resolve the data directory from configuration and environment.
#[must_use]
pub fn resolve(configured: Option<&Path>) -> PathBuf {
    resolve_from(&candidates(configured))
}

/// Return the first candidate that can be created and passes a probe write,
/// falling back to the current working directory.
#[must_use]
pub fn resolve_from(candidates: &[PathBuf]) -> PathBuf {
    for candidate in candidates {
        match probe(candidate) {
            Ok(()) => {
                let resolved = absolutize(candidate);
                debug!(path = %resolved.display(), "data directory resolved");
                return resolved;
            }
            Err(err) => {
                debug!(path = %candidate.display(), %err, "data directory candidate rejected");
            }
        }
    }

    let fallback = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    info!(
        path = %fallback.display(),
        "no persistent data directory available, using working directory"
    );
    fallback
}

/// Create `dir` if needed and prove it is writable.
fn probe(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe_path = dir.join(format!(".write-probe-{}", uuid::Uuid::new_v4()));
    let result = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe_path)
        .and_then(|mut file| file.write_all(b"probe"));

    if probe_path.exists() {
        if let Err(err) = fs::remove_file(&probe_path) {
            warn!(path = %probe_path.display(), %err, "failed to remove probe file");
        }
    }

    result
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
}
