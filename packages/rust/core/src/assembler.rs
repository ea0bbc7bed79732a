//! Batch result assembly.
//!
//! Workers finish in arbitrary order. The assembler restores source order and
//! splits the batch into export rows (enriched records) and the asset ids
//! still pending, which are the ones the failure log explains.

use assetenrich_shared::{ExportRow, Record};

/// Final state of a batch, ready to checkpoint and export.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    /// Every record of the batch, in source order.
    pub records: Vec<Record>,
    /// One row per enriched record, in source order.
    pub rows: Vec<ExportRow>,
    /// Asset ids of records left pending.
    pub pending: Vec<String>,
}

impl BatchOutput {
    pub fn enriched_count(&self) -> usize {
        self.rows.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Order `records` by source position and build the export rows.
pub fn assemble(mut records: Vec<Record>) -> BatchOutput {
    records.sort_by_key(Record::position);

    let mut rows = Vec::with_capacity(records.len());
    let mut pending = Vec::new();
    for record in &records {
        match ExportRow::from_record(record) {
            Some(row) => rows.push(row),
            None => pending.push(record.asset_id().to_string()),
        }
    }

    BatchOutput {
        records,
        rows,
        pending,
    }
}
