//! CSV record source and export sink.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use assetenrich_shared::{EnrichError, ExportRow, Record, Result, SourceConfig};

/// Header of the exported sheet.
const EXPORT_HEADER: [&str; 2] = ["Asset ID", "Waranty Expiration"];

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Produces the initial list of pending records for a batch.
pub trait RecordSource: Send + Sync {
    /// Load every record to enrich. A failure here is fatal to the batch.
    fn load(&self) -> Result<Vec<Record>>;
}

/// Consumes the exported rows at the end of a batch.
pub trait RecordSink: Send + Sync {
    fn write(&self, rows: &[ExportRow]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// CsvSource
// ---------------------------------------------------------------------------

/// Reads an inventory CSV and keeps the rows of one category.
pub struct CsvSource {
    path: PathBuf,
    columns: SourceConfig,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, columns: SourceConfig) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    fn load_from<R: Read>(&self, reader: R) -> Result<Vec<Record>> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv
            .headers()
            .map_err(|e| EnrichError::load(format!("{}: unreadable header: {e}", self.path.display())))?
            .clone();

        let column = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                EnrichError::load(format!(
                    "{}: missing column {name:?}",
                    self.path.display()
                ))
            })
        };
        let category_idx = column(&self.columns.category_column)?;
        let identity_idx = column(&self.columns.identity_column)?;
        let key_idx = column(&self.columns.lookup_key_column)?;

        let needle = self.columns.category.to_lowercase();
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (line, row) in csv.records().enumerate() {
            let row = row.map_err(|e| {
                EnrichError::load(format!("{}: row {}: {e}", self.path.display(), line + 2))
            })?;

            let in_category = row
                .get(category_idx)
                .is_some_and(|c| c.to_lowercase().contains(&needle));
            if !in_category {
                continue;
            }

            let identity = row.get(identity_idx).unwrap_or_default();
            let key = row.get(key_idx).unwrap_or_default();
            if identity.is_empty() || key.is_empty() {
                warn!(row = line + 2, identity, key, "row has no asset id or serial number, skipping");
                skipped += 1;
                continue;
            }

            records.push(Record::new(identity, key, records.len()));
        }

        info!(
            path = %self.path.display(),
            category = %self.columns.category,
            records = records.len(),
            skipped,
            "source loaded"
        );
        Ok(records)
    }
}

impl RecordSource for CsvSource {
    fn load(&self) -> Result<Vec<Record>> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| EnrichError::load(format!("cannot open {}: {e}", self.path.display())))?;
        self.load_from(file)
    }
}

// ---------------------------------------------------------------------------
// CsvSink
// ---------------------------------------------------------------------------

/// Writes export rows as `Asset ID,Waranty Expiration`.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvSink {
    fn write(&self, rows: &[ExportRow]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EnrichError::io(parent, e))?;
        }

        let csv_err = |e: csv::Error| EnrichError::Serialization(format!("{}: {e}", self.path.display()));

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)
            .map_err(csv_err)?;

        writer.write_record(EXPORT_HEADER).map_err(csv_err)?;
        for row in rows {
            writer
                .write_record([row.asset_id.as_str(), row.warranty_expiration.as_str()])
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|e| EnrichError::io(&self.path, e))?;

        debug!(path = %self.path.display(), rows = rows.len(), "export written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const INVENTORY: &str = "\
Asset ID,Manufacturer,Serial number,Location
A1,Dell Inc.,SN1,HQ
A2,Lenovo,LN2,HQ
A3,dell,SN3,Remote
A4,Dell,,HQ
A5,,SN5,HQ
A6,DELL,SN6,HQ
";

    fn source() -> CsvSource {
        CsvSource::new("inventory.csv", SourceConfig::default())
    }

    #[test]
    fn filters_by_category_case_insensitively() {
        let records = source().load_from(INVENTORY.as_bytes()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.asset_id()).collect();
        assert_eq!(ids, ["A1", "A3", "A6"]);
        assert_eq!(records[1].serial_number(), "SN3");
    }

    #[test]
    fn positions_follow_kept_rows() {
        let records = source().load_from(INVENTORY.as_bytes()).unwrap();
        let positions: Vec<_> = records.iter().map(|r| r.position()).collect();
        assert_eq!(positions, [0, 1, 2]);
        assert!(records.iter().all(|r| !r.is_enriched()));
    }

    #[test]
    fn duplicate_rows_are_kept() {
        let csv = "Asset ID,Manufacturer,Serial number\nA1,Dell,SN1\nA1,Dell,SN1\n";
        let records = source().load_from(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn missing_column_is_load_error() {
        let csv = "Asset ID,Vendor,Serial number\nA1,Dell,SN1\n";
        let err = source().load_from(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, EnrichError::Load { .. }));
        assert!(err.to_string().contains("Manufacturer"));
    }

    #[test]
    fn missing_file_is_load_error() {
        let src = CsvSource::new(
            std::env::temp_dir().join(format!("ae-missing-{}.csv", Uuid::now_v7())),
            SourceConfig::default(),
        );
        assert!(matches!(src.load().unwrap_err(), EnrichError::Load { .. }));
    }

    #[test]
    fn sink_writes_header_and_rows() {
        let path = std::env::temp_dir()
            .join(format!("ae-sink-{}", Uuid::now_v7()))
            .join("warranty.csv");
        let sink = CsvSink::new(&path);
        sink.write(&[
            ExportRow {
                asset_id: "A1".into(),
                warranty_expiration: "01/01/2026".into(),
            },
            ExportRow {
                asset_id: "A3".into(),
                warranty_expiration: "12/31/2027".into(),
            },
        ])
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Asset ID,Waranty Expiration\nA1,01/01/2026\nA3,12/31/2027\n"
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn sink_writes_header_for_empty_export() {
        let path = std::env::temp_dir().join(format!("ae-empty-{}.csv", Uuid::now_v7()));
        CsvSink::new(&path).write(&[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Asset ID,Waranty Expiration\n"
        );
        let _ = std::fs::remove_file(&path);
    }
}
