//! Append-only record of per-record failures.
//!
//! Entries are meant for an operator reading the file after a run, so the
//! format is plain text: timestamp, batch, asset id, error and cause chain.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use tracing::error;

use assetenrich_shared::{BatchId, EnrichError, Result};

/// Separator written after every entry.
const ENTRY_SEPARATOR: &str = "**************************************************";

/// Sink for records whose lookup failed.
///
/// `record` is called concurrently from every worker; each call must land as
/// one complete entry.
pub trait FailureLog: Send + Sync {
    fn record(&self, identity: &str, error: &EnrichError);
}

// ---------------------------------------------------------------------------
// FileFailureLog
// ---------------------------------------------------------------------------

/// Failure log appended to a text file.
pub struct FileFailureLog {
    path: PathBuf,
    batch_id: BatchId,
    file: Mutex<File>,
}

impl FileFailureLog {
    /// Open (or create) `path` in append mode.
    pub fn open(path: impl Into<PathBuf>, batch_id: BatchId) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EnrichError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EnrichError::io(&path, e))?;

        Ok(Self {
            path,
            batch_id,
            file: Mutex::new(file),
        })
    }

}

impl FailureLog for FileFailureLog {
    fn record(&self, identity: &str, err: &EnrichError) {
        let entry = format_entry(&self.batch_id, identity, err);

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.write_all(entry.as_bytes()).and_then(|()| file.flush()) {
            error!(path = %self.path.display(), identity, error = %e, "failed to write failure log entry");
        }
    }
}

/// Render one failure entry, including the error's `source()` chain.
fn format_entry(batch_id: &BatchId, identity: &str, err: &EnrichError) -> String {
    let mut entry = format!(
        "[{}] [BATCH {batch_id}] [ASSET {identity}]: failed to process\n[ERROR]: {err}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    let mut cause = std::error::Error::source(err);
    while let Some(inner) = cause {
        entry.push_str(&format!("[CAUSE]: {inner}\n"));
        cause = inner.source();
    }

    entry.push_str(ENTRY_SEPARATOR);
    entry.push_str("\n\n");
    entry
}

// ---------------------------------------------------------------------------
// MemoryFailureLog
// ---------------------------------------------------------------------------

/// A logged failure, as kept by [`MemoryFailureLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEntry {
    pub identity: String,
    pub message: String,
}

/// In-memory failure log.
#[derive(Debug, Default)]
pub struct MemoryFailureLog {
    entries: Mutex<Vec<FailureEntry>>,
}

impl MemoryFailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries recorded so far.
    pub fn entries(&self) -> Vec<FailureEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of entries bearing `identity`.
    pub fn count_for(&self, identity: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.identity == identity)
            .count()
    }
}

impl FailureLog for MemoryFailureLog {
    fn record(&self, identity: &str, err: &EnrichError) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FailureEntry {
                identity: identity.to_string(),
                message: err.to_string(),
            });
    }
}
