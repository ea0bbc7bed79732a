//! End-to-end batch flows: load → enrich → checkpoint → export.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use assetenrich_lookup::LookupProvider;
use assetenrich_shared::{BatchConfig, BatchId, DateNormalizer, Record, Result};
use assetenrich_storage::{RecordSink, RecordSource, checkpoint};

use crate::assembler::{self, BatchOutput};
use crate::failure_log::FailureLog;
use crate::pool::{PoolConfig, PoolReport, WorkerPool};
use crate::queue::TaskQueue;

/// Progress callback for reporting batch status.
pub trait BatchProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called by a worker after each record, successful or not.
    fn record_finished(&self, asset_id: &str, enriched: bool, done: usize, total: usize);
    /// Called when the batch completes.
    fn done(&self, result: &BatchResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn record_finished(&self, _asset_id: &str, _enriched: bool, _done: usize, _total: usize) {}
    fn done(&self, _result: &BatchResult) {}
}

/// Collaborators shared by every flow that runs the worker pool.
#[derive(Clone)]
pub struct BatchContext {
    pub batch_id: BatchId,
    pub provider: Arc<dyn LookupProvider>,
    pub normalizer: Arc<DateNormalizer>,
    pub failures: Arc<dyn FailureLog>,
    pub progress: Arc<dyn BatchProgress>,
}

/// Result of a batch run.
#[derive(Debug)]
pub struct BatchResult {
    pub batch_id: BatchId,
    /// Records, export rows and pending ids in source order.
    pub output: BatchOutput,
    /// Counts from the pool run (only records that were queued).
    pub report: PoolReport,
    /// Total elapsed time, including load and checkpoint.
    pub elapsed: Duration,
}

/// Run a full batch.
///
/// 1. Load records from `source` (a failure here aborts before any lookup)
/// 2. Drain them through the worker pool
/// 3. Write the checkpoint with every record
/// 4. Write the export rows to `sink`, if given
#[instrument(skip_all, fields(batch_id = %ctx.batch_id, pool_size = config.pool_size))]
pub async fn run_batch(
    config: &BatchConfig,
    source: &dyn RecordSource,
    sink: Option<&dyn RecordSink>,
    ctx: &BatchContext,
) -> Result<BatchResult> {
    let start = Instant::now();

    ctx.progress.phase("Loading records");
    let records = source.load()?;
    info!(records = records.len(), "starting batch");

    finish_batch(config, records, sink, ctx, start).await
}

/// Retry the records a previous batch left pending.
///
/// Reloads the checkpoint, runs only the pending records through the pool,
/// and rewrites the checkpoint with the merged result. Records already
/// enriched are carried over untouched.
#[instrument(skip_all, fields(batch_id = %ctx.batch_id, checkpoint = %config.checkpoint_path.display()))]
pub async fn rerun_pending(
    config: &BatchConfig,
    sink: Option<&dyn RecordSink>,
    ctx: &BatchContext,
) -> Result<BatchResult> {
    let start = Instant::now();

    ctx.progress.phase("Loading checkpoint");
    let entries = checkpoint::load_checkpoint(&config.checkpoint_path)?;
    let records = checkpoint::reconstruct(entries, &ctx.normalizer)?;
    info!(
        records = records.len(),
        pending = records.iter().filter(|r| !r.is_enriched()).count(),
        "retrying pending records"
    );

    finish_batch(config, records, sink, ctx, start).await
}

async fn finish_batch(
    config: &BatchConfig,
    records: Vec<Record>,
    sink: Option<&dyn RecordSink>,
    ctx: &BatchContext,
    start: Instant,
) -> Result<BatchResult> {
    let pool = WorkerPool::new(PoolConfig::from(config))?;

    ctx.progress.phase("Looking up warranty dates");
    let (output, report) = enrich_records(records, &pool, ctx).await;

    ctx.progress.phase("Saving checkpoint");
    checkpoint::save_checkpoint(&config.checkpoint_path, &output.records)?;

    if let Some(sink) = sink {
        ctx.progress.phase("Exporting");
        sink.write(&output.rows)?;
    }

    let result = BatchResult {
        batch_id: ctx.batch_id.clone(),
        output,
        report,
        elapsed: start.elapsed(),
    };

    info!(
        enriched = result.output.enriched_count(),
        pending = result.output.pending_count(),
        duration_ms = result.elapsed.as_millis() as u64,
        "batch completed"
    );
    ctx.progress.done(&result);

    Ok(result)
}

/// Run every pending record through `pool` and assemble the batch.
///
/// Records that are already enriched skip the queue and are merged back in
/// their source position.
pub async fn enrich_records(
    records: Vec<Record>,
    pool: &WorkerPool,
    ctx: &BatchContext,
) -> (BatchOutput, PoolReport) {
    let (todo, mut finished): (Vec<Record>, Vec<Record>) =
        records.into_iter().partition(|r| !r.is_enriched());

    let queue = Arc::new(TaskQueue::from_records(todo));
    let report = pool
        .run(
            queue.clone(),
            ctx.provider.clone(),
            ctx.normalizer.clone(),
            ctx.failures.clone(),
            ctx.progress.clone(),
        )
        .await;

    finished.extend(queue.take_completed());
    (assembler::assemble(finished), report)
}

/// Re-normalize every date in a checkpoint and write it back.
///
/// Returns the number of entries rewritten.
#[instrument(skip(normalizer))]
pub fn renormalize_checkpoint(path: &Path, normalizer: &DateNormalizer) -> Result<usize> {
    let entries = checkpoint::load_checkpoint(path)?;
    let records = checkpoint::reconstruct(entries, normalizer)?;
    checkpoint::save_checkpoint(path, &records)?;
    info!(entries = records.len(), "checkpoint re-normalized");
    Ok(records.len())
}

/// Export the enriched records of a checkpoint to `sink`.
///
/// Returns the number of rows written.
#[instrument(skip(normalizer, sink))]
pub fn export_checkpoint(
    path: &Path,
    normalizer: &DateNormalizer,
    sink: &dyn RecordSink,
) -> Result<usize> {
    let entries = checkpoint::load_checkpoint(path)?;
    let output = assembler::assemble(checkpoint::reconstruct(entries, normalizer)?);
    sink.write(&output.rows)?;
    info!(
        rows = output.rows.len(),
        skipped = output.pending.len(),
        "checkpoint exported"
    );
    Ok(output.rows.len())
}
