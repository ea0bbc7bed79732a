//! JSON checkpoint: an array of [`PersistedRecord`] objects.
//!
//! Every record of a batch is written, pending ones with a `null` date, so a
//! later run can find and retry them.

use std::path::Path;

use tracing::{debug, info};

use assetenrich_shared::{DateNormalizer, EnrichError, PersistedRecord, Record, Result};

/// Write all `records` to `path` as pretty-printed JSON.
pub fn save_checkpoint(path: &Path, records: &[Record]) -> Result<()> {
    let entries: Vec<PersistedRecord> = records.iter().map(Record::to_persisted).collect();
    save_persisted(path, &entries)
}

/// Write already-persisted entries to `path`.
///
/// The file is written next to its destination and renamed into place, so an
/// interrupted write never leaves a truncated checkpoint behind.
pub fn save_persisted(path: &Path, entries: &[PersistedRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| EnrichError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| EnrichError::Serialization(format!("checkpoint: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| EnrichError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| EnrichError::io(path, e))?;

    info!(path = %path.display(), entries = entries.len(), "checkpoint saved");
    Ok(())
}

/// Read the checkpoint at `path`.
pub fn load_checkpoint(path: &Path) -> Result<Vec<PersistedRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;
    let entries: Vec<PersistedRecord> = serde_json::from_str(&content).map_err(|e| {
        EnrichError::Serialization(format!("invalid checkpoint {}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), entries = entries.len(), "checkpoint loaded");
    Ok(entries)
}

/// Rebuild records from checkpoint entries, re-normalizing every date.
///
/// Positions follow the order of `entries`.
pub fn reconstruct(entries: Vec<PersistedRecord>, normalizer: &DateNormalizer) -> Result<Vec<Record>> {
    entries
        .into_iter()
        .enumerate()
        .map(|(position, entry)| Record::from_persisted(entry, position, normalizer))
        .collect()
}

/// Entries whose warranty date is missing.
pub fn find_unenriched(entries: &[PersistedRecord]) -> Vec<&PersistedRecord> {
    entries
        .iter()
        .filter(|e| e.warranty_expiration.is_none())
        .collect()
}
