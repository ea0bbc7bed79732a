//! File-backed persistence for assetenrich.
//!
//! - [`checkpoint`]: the JSON checkpoint between a batch run and later
//!   export, retry or re-normalization
//! - [`tabular`]: CSV record source (input spreadsheet) and export sink
//!
//! Both sides sit behind traits ([`RecordSource`], [`RecordSink`]) so the
//! pipeline can run against in-memory fakes.

pub mod checkpoint;
pub mod tabular;

pub use checkpoint::{find_unenriched, load_checkpoint, reconstruct, save_checkpoint, save_persisted};
pub use tabular::{CsvSink, CsvSource, RecordSink, RecordSource};
