//! Concurrent enrichment pipeline for assetenrich.
//!
//! This crate ties the pieces of a batch together:
//! - [`queue`]: the shared FIFO workers pull records from
//! - [`pool`]: the fixed-size worker pool and the per-record lookup step
//! - [`failure_log`]: the append-only sink for per-record failures
//! - [`assembler`]: source-ordered results and export rows
//! - [`pipeline`]: end-to-end flows (`run_batch`, `rerun_pending`, export)

pub mod assembler;
pub mod failure_log;
pub mod pipeline;
pub mod pool;
pub mod queue;

pub use assembler::{BatchOutput, assemble};
pub use failure_log::{FailureEntry, FailureLog, FileFailureLog, MemoryFailureLog};
pub use pipeline::{
    BatchContext, BatchProgress, BatchResult, SilentProgress, enrich_records, export_checkpoint,
    renormalize_checkpoint, rerun_pending, run_batch,
};
pub use pool::{PoolConfig, PoolReport, WorkerPool, process_record};
pub use queue::TaskQueue;
