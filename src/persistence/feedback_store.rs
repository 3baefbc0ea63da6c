//! Append-only feedback log with dual-format read support.
//!
//! Records are stored one compact JSON object per line in a single file.
//! Files written by older releases hold one JSON array instead; the first
//! write that finds the array signature rewrites the file as NDJSON, after
//! which every write is a plain append. Reads accept either form, and a mix
//! of both, through [`log_format::parse`].

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, info_span, warn};

use super::log_format;
use crate::models::FeedbackRecord;
use crate::{AppError, Result};

/// How a `merge_or_append` call landed in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Folded into the session's open record.
    Merged,
    /// Written as a new record.
    Appended,
}

/// Durable feedback log backed by one file.
///
/// Writers within the process are serialised by an internal mutex. Readers
/// take no lock; rewrites replace the file atomically so a reader sees
/// either the old or the new content.
#[derive(Debug)]
pub struct FeedbackStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FeedbackStore {
    /// Store backed by the file at `path`. Nothing is touched until the first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by `file_name` inside `data_dir`.
    #[must_use]
    pub fn in_dir(data_dir: &Path, file_name: &str) -> Self {
        Self::new(data_dir.join(file_name))
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every readable record, in file order.
    ///
    /// Never fails: a missing or unreadable file yields an empty list and
    /// malformed fragments are skipped.
    #[must_use]
    pub fn read_all(&self) -> Vec<FeedbackRecord> {
        let Some(text) = self.read_text() else {
            return Vec::new();
        };
        into_records(log_format::parse(&text).into_values())
    }

    /// Append one record as a compact JSON line, migrating a legacy array
    /// file first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory, migration, or append fails.
    /// Callers log and swallow it; a lost feedback write must not take the
    /// server down.
    pub fn append(&self, record: &FeedbackRecord) -> Result<()> {
        let _guard = self.lock();
        self.ensure_parent_dir()?;
        self.migrate_locked()?;
        self.append_line_locked(record)
    }

    /// Convert a legacy array file to NDJSON.
    ///
    /// Returns `true` if a rewrite happened. Running it on an NDJSON or
    /// missing file is a no-op because neither begins with `[`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the rewrite cannot be persisted.
    pub fn migrate(&self) -> Result<bool> {
        let _guard = self.lock();
        self.ensure_parent_dir()?;
        self.migrate_locked()
    }

    /// Fold `partial` into the session's open record, or append it.
    ///
    /// The merge target is the most recent record carrying the same
    /// `session_id` that is still open (no rating or no start time). Records
    /// of other sessions, and legacy records without a session id, are never
    /// merge targets.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the rewrite or append fails.
    pub fn merge_or_append(
        &self,
        mut partial: FeedbackRecord,
        session_id: &str,
    ) -> Result<MergeOutcome> {
        let span = info_span!("merge_or_append", session_id);
        let _span = span.enter();

        partial.session_id = Some(session_id.to_owned());

        let _guard = self.lock();
        self.ensure_parent_dir()?;
        self.migrate_locked()?;

        let mut records = self.read_all();
        let target = records
            .iter()
            .rposition(|record| record.belongs_to(session_id))
            .filter(|&index| records[index].is_open());

        if let Some(index) = target {
            records[index].merge_from(partial);
            self.rewrite_locked(&records)?;
            debug!(index, "merged into open feedback record");
            Ok(MergeOutcome::Merged)
        } else {
            self.append_line_locked(&partial)?;
            debug!("appended new feedback record");
            Ok(MergeOutcome::Appended)
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_text(&self) -> Option<String> {
        match fs::read(&self.path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read feedback log");
                None
            }
        }
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Io(format!(
                    "failed to create feedback directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    fn migrate_locked(&self) -> Result<bool> {
        let Some(text) = self.read_text() else {
            return Ok(false);
        };
        if !log_format::has_array_signature(&text) {
            return Ok(false);
        }

        let records = into_records(log_format::parse(&text).into_values());
        self.rewrite_locked(&records)?;
        info!(
            path = %self.path.display(),
            records = records.len(),
            "migrated feedback log from array to line-delimited format"
        );
        Ok(true)
    }

    /// Replace the whole file with `records` as NDJSON via a temp file in the
    /// same directory.
    fn rewrite_locked(&self, records: &[FeedbackRecord]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|err| AppError::Io(format!("failed to create temp file: {err}")))?;
        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(temp, "{line}")
                .map_err(|err| AppError::Io(format!("failed to write temp file: {err}")))?;
        }
        temp.flush()
            .map_err(|err| AppError::Io(format!("failed to flush temp file: {err}")))?;
        temp.persist(&self.path).map_err(|err| {
            AppError::Io(format!(
                "failed to replace {}: {}",
                self.path.display(),
                err.error
            ))
        })?;
        Ok(())
    }

    fn append_line_locked(&self, record: &FeedbackRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)
            .map_err(|err| {
                AppError::Io(format!(
                    "failed to open feedback log {}: {err}",
                    self.path.display()
                ))
            })?;

        // Keep a torn previous write on its own line.
        if !ends_with_newline(&mut file)? {
            line.insert(0, '\n');
        }

        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|err| AppError::Io(format!("failed to append feedback record: {err}")))
    }
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut fs::File) -> Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn into_records(values: Vec<Value>) -> Vec<FeedbackRecord> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(object) => Some(FeedbackRecord::from_object(object)),
            _ => None,
        })
        .collect()
}
