//! Core domain types: records, their persisted form and export rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::date::{self, DateNormalizer};
use crate::error::{EnrichError, Result};

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one batch run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    /// Generate a new time-sortable batch identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Where a record is in its enrichment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentState {
    /// Not looked up yet, or the lookup failed.
    Pending,
    /// The lookup succeeded with this canonical date.
    Enriched(NaiveDate),
}

/// An inventory asset to be enriched with its warranty expiration date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    asset_id: String,
    serial_number: String,
    state: EnrichmentState,
    position: usize,
}

impl Record {
    /// Create a pending record. `position` is its index in the source list.
    pub fn new(
        asset_id: impl Into<String>,
        serial_number: impl Into<String>,
        position: usize,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            serial_number: serial_number.into(),
            state: EnrichmentState::Pending,
            position,
        }
    }

    /// Stable external key (asset id).
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Key used for the external lookup (serial number).
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn state(&self) -> EnrichmentState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The warranty date, if the record has been enriched.
    pub fn warranty_expiration(&self) -> Option<NaiveDate> {
        match self.state {
            EnrichmentState::Enriched(date) => Some(date),
            EnrichmentState::Pending => None,
        }
    }

    pub fn is_enriched(&self) -> bool {
        matches!(self.state, EnrichmentState::Enriched(_))
    }

    /// Move the record from `Pending` to `Enriched`.
    ///
    /// A record is enriched at most once; a second call is rejected and
    /// leaves the existing date untouched.
    pub fn enrich(&mut self, date: NaiveDate) -> Result<()> {
        match self.state {
            EnrichmentState::Pending => {
                self.state = EnrichmentState::Enriched(date);
                Ok(())
            }
            EnrichmentState::Enriched(existing) => Err(EnrichError::validation(format!(
                "asset {} is already enriched ({})",
                self.asset_id,
                date::display(existing)
            ))),
        }
    }

    /// The persisted (checkpoint) form of this record.
    pub fn to_persisted(&self) -> PersistedRecord {
        PersistedRecord {
            serial_number: self.serial_number.clone(),
            asset_id: self.asset_id.clone(),
            warranty_expiration: self.warranty_expiration().map(date::display),
        }
    }

    /// Rebuild a record from its persisted form, re-normalizing the date.
    pub fn from_persisted(
        persisted: PersistedRecord,
        position: usize,
        normalizer: &DateNormalizer,
    ) -> Result<Self> {
        let mut record = Self::new(persisted.asset_id, persisted.serial_number, position);
        if let Some(raw) = persisted.warranty_expiration.as_deref() {
            record.enrich(normalizer.normalize(raw)?)?;
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// PersistedRecord
// ---------------------------------------------------------------------------

/// One entry of the JSON checkpoint file.
///
/// Key names (including the `Waranty` spelling) match checkpoint files
/// already in circulation and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(rename = "Serial Number")]
    pub serial_number: String,
    #[serde(rename = "Asset ID")]
    pub asset_id: String,
    /// Display-format date, `null` for records that were never enriched.
    #[serde(rename = "Waranty Expiration", default)]
    pub warranty_expiration: Option<String>,
}

// ---------------------------------------------------------------------------
// ExportRow
// ---------------------------------------------------------------------------

/// One row of the tabular export. Only enriched records produce rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Asset ID")]
    pub asset_id: String,
    #[serde(rename = "Waranty Expiration")]
    pub warranty_expiration: String,
}

impl ExportRow {
    /// Build the export row for `record`, or `None` if it is still pending.
    pub fn from_record(record: &Record) -> Option<Self> {
        record.warranty_expiration().map(|date| Self {
            asset_id: record.asset_id.clone(),
            warranty_expiration: date::display(date),
        })
    }
}
