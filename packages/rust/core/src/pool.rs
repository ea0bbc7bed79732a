//! Fixed-size worker pool draining a [`TaskQueue`].
//!
//! Each worker is a tokio task looping pop → lookup → normalize → enrich →
//! complete until the queue is empty. A failed record is written to the
//! [`FailureLog`] and left pending; it never stops the worker or the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use assetenrich_lookup::LookupProvider;
use assetenrich_shared::{BatchConfig, DateNormalizer, EnrichError, Record, Result};

use crate::failure_log::FailureLog;
use crate::pipeline::BatchProgress;
use crate::queue::TaskQueue;

/// Pool sizing and per-lookup timeout.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent workers. Must be at least 1.
    pub pool_size: usize,
    /// Upper bound on a single provider call.
    pub lookup_timeout: Duration,
}

impl From<&BatchConfig> for PoolConfig {
    fn from(config: &BatchConfig) -> Self {
        Self {
            pool_size: config.pool_size,
            lookup_timeout: config.lookup_timeout,
        }
    }
}

/// Counts from one pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    /// Records taken off the queue.
    pub attempted: usize,
    /// Records whose lookup succeeded.
    pub enriched: usize,
    /// Records left pending after a logged failure.
    pub failed: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

/// Everything a worker needs besides the queue.
struct WorkerShared {
    provider: Arc<dyn LookupProvider>,
    normalizer: Arc<DateNormalizer>,
    failures: Arc<dyn FailureLog>,
    progress: Arc<dyn BatchProgress>,
    lookup_timeout: Duration,
    total: usize,
    attempted: AtomicUsize,
    enriched: AtomicUsize,
    failed: AtomicUsize,
}

/// N concurrent lookup workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: PoolConfig,
}

impl WorkerPool {
    /// Create a pool. Fails if `pool_size` is zero.
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(EnrichError::config("pool_size must be at least 1"));
        }
        Ok(Self { config })
    }

    /// Drain `queue` with `pool_size` workers.
    ///
    /// Returns once every worker has exited, which happens only after the
    /// queue is empty and every checked-out record has been completed.
    #[instrument(skip_all, fields(pool_size = self.config.pool_size, provider = provider.name()))]
    pub async fn run(
        &self,
        queue: Arc<TaskQueue>,
        provider: Arc<dyn LookupProvider>,
        normalizer: Arc<DateNormalizer>,
        failures: Arc<dyn FailureLog>,
        progress: Arc<dyn BatchProgress>,
    ) -> PoolReport {
        let start = Instant::now();
        let total = queue.pending_len();

        let shared = Arc::new(WorkerShared {
            provider,
            normalizer,
            failures,
            progress,
            lookup_timeout: self.config.lookup_timeout,
            total,
            attempted: AtomicUsize::new(0),
            enriched: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        info!(
            records = total,
            timeout_ms = self.config.lookup_timeout.as_millis() as u64,
            "starting worker pool"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.pool_size {
            workers.spawn(worker_loop(worker_id, queue.clone(), shared.clone()));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task aborted");
            }
        }

        if !queue.is_drained() {
            warn!(
                pending = queue.pending_len(),
                in_flight = queue.in_flight(),
                "worker pool exited before the queue drained"
            );
        }

        let report = PoolReport {
            attempted: shared.attempted.load(Ordering::Relaxed),
            enriched: shared.enriched.load(Ordering::Relaxed),
            failed: shared.failed.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        };

        info!(
            attempted = report.attempted,
            enriched = report.enriched,
            failed = report.failed,
            duration_ms = report.elapsed.as_millis() as u64,
            "worker pool finished"
        );

        report
    }
}

async fn worker_loop(worker_id: usize, queue: Arc<TaskQueue>, shared: Arc<WorkerShared>) {
    debug!(worker_id, "worker started");

    while let Some(mut record) = queue.try_pop() {
        shared.attempted.fetch_add(1, Ordering::Relaxed);

        let outcome = guarded_lookup(&record, &shared)
            .await
            .and_then(|date| record.enrich(date));

        let enriched = match outcome {
            Ok(()) => {
                debug!(worker_id, asset_id = record.asset_id(), "record enriched");
                shared.enriched.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(
                    worker_id,
                    asset_id = record.asset_id(),
                    serial = record.serial_number(),
                    error = %e,
                    "lookup failed, record left pending"
                );
                record_failure(&shared, record.asset_id(), e).await;
                shared.failed.fetch_add(1, Ordering::Relaxed);
                false
            }
        };

        let asset_id = record.asset_id().to_string();
        queue.complete(record);

        let done = shared.enriched.load(Ordering::Relaxed) + shared.failed.load(Ordering::Relaxed);
        shared
            .progress
            .record_finished(&asset_id, enriched, done, shared.total);
    }

    debug!(worker_id, "queue empty, worker exiting");
}

/// Write a failure entry on the blocking pool; file logs do disk I/O.
async fn record_failure(shared: &WorkerShared, asset_id: &str, err: EnrichError) {
    let failures = shared.failures.clone();
    let identity = asset_id.to_string();
    if let Err(e) = tokio::task::spawn_blocking(move || failures.record(&identity, &err)).await {
        error!(asset_id, error = %e, "failure log write aborted");
    }
}

/// Run [`process_record`] in its own task so a panicking provider fails
/// only this record. The worker keeps the record and hands it back.
async fn guarded_lookup(record: &Record, shared: &WorkerShared) -> Result<NaiveDate> {
    let task_record = record.clone();
    let provider = shared.provider.clone();
    let normalizer = shared.normalizer.clone();
    let timeout = shared.lookup_timeout;

    let handle = tokio::spawn(async move {
        process_record(&task_record, provider.as_ref(), &normalizer, timeout).await
    });

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(EnrichError::lookup(
            record.serial_number(),
            "provider panicked",
        )),
        Err(e) => Err(EnrichError::lookup(
            record.serial_number(),
            format!("lookup task aborted: {e}"),
        )),
    }
}

/// Look up one record and normalize the answer.
///
/// The provider call is bounded by `timeout`; running out of time is a
/// [`EnrichError::Timeout`]. The record itself is not touched.
pub async fn process_record(
    record: &Record,
    provider: &dyn LookupProvider,
    normalizer: &DateNormalizer,
    timeout: Duration,
) -> Result<NaiveDate> {
    let key = record.serial_number();

    let raw = tokio::time::timeout(timeout, provider.fetch(key))
        .await
        .map_err(|_| EnrichError::Timeout {
            key: key.to_string(),
            timeout,
        })??;

    normalizer.normalize(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::failure_log::MemoryFailureLog;
    use crate::pipeline::SilentProgress;

    /// Provider answering from a fixed table; unknown keys fail.
    struct TableProvider {
        answers: HashMap<String, String>,
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl TableProvider {
        fn new(answers: &[(&str, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LookupProvider for TableProvider {
        async fn fetch(&self, lookup_key: &str) -> Result<String> {
            self.calls.lock().unwrap().push(lookup_key.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answers
                .get(lookup_key)
                .cloned()
                .ok_or_else(|| EnrichError::lookup(lookup_key, "no warranty data"))
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    /// Provider that never answers for one key.
    struct StuckProvider {
        stuck_key: String,
    }

    #[async_trait]
    impl LookupProvider for StuckProvider {
        async fn fetch(&self, lookup_key: &str) -> Result<String> {
            if lookup_key == self.stuck_key {
                std::future::pending::<()>().await;
            }
            Ok("Expires 01 Jan 2026".into())
        }

        fn name(&self) -> &str {
            "stuck"
        }
    }

    /// Provider that panics for one key and answers every other one.
    struct PanickingProvider {
        bad_key: String,
    }

    #[async_trait]
    impl LookupProvider for PanickingProvider {
        async fn fetch(&self, lookup_key: &str) -> Result<String> {
            if lookup_key == self.bad_key {
                panic!("provider blew up on {lookup_key}");
            }
            Ok("Expires 01 Jan 2026".into())
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    /// Failure log remembering which thread each entry was written from.
    #[derive(Default)]
    struct ThreadTrackingLog {
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl FailureLog for ThreadTrackingLog {
        fn record(&self, _identity: &str, _error: &EnrichError) {
            self.threads.lock().unwrap().push(std::thread::current().id());
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(format!("A{i}"), format!("SN{i}"), i))
            .collect()
    }

    fn pool(size: usize) -> WorkerPool {
        WorkerPool::new(PoolConfig {
            pool_size: size,
            lookup_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    async fn drain(
        pool: &WorkerPool,
        input: Vec<Record>,
        provider: Arc<dyn LookupProvider>,
        failures: Arc<MemoryFailureLog>,
    ) -> (Vec<Record>, PoolReport) {
        let queue = Arc::new(TaskQueue::from_records(input));
        let report = pool
            .run(
                queue.clone(),
                provider,
                Arc::new(DateNormalizer::default()),
                failures,
                Arc::new(SilentProgress),
            )
            .await;
        assert!(queue.is_drained());
        (queue.take_completed(), report)
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let err = WorkerPool::new(PoolConfig {
            pool_size: 0,
            lookup_timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(matches!(err, EnrichError::Config { .. }));
    }

    #[tokio::test]
    async fn success_sets_normalized_date() {
        let provider = Arc::new(TableProvider::new(&[("SN0", "Expires 01 Jan 2026")]));
        let failures = Arc::new(MemoryFailureLog::new());

        let (done, report) = drain(&pool(2), records(1), provider, failures.clone()).await;

        let expected = DateNormalizer::default().normalize("Expires 01 Jan 2026").unwrap();
        assert_eq!(done[0].warranty_expiration(), Some(expected));
        assert_eq!(report.enriched, 1);
        assert!(failures.entries().is_empty());
    }

    #[tokio::test]
    async fn failures_are_isolated_and_logged_once() {
        let provider = Arc::new(TableProvider::new(&[
            ("SN0", "Expires 01 Jan 2026"),
            ("SN1", "Expires whenever"),
            ("SN3", "Expired 15 Aug 2022"),
        ]));
        let failures = Arc::new(MemoryFailureLog::new());

        let (done, report) = drain(&pool(3), records(4), provider, failures.clone()).await;

        let by_id: HashMap<_, _> = done.iter().map(|r| (r.asset_id().to_string(), r)).collect();
        assert!(by_id["A0"].is_enriched());
        assert!(!by_id["A1"].is_enriched());
        assert!(!by_id["A2"].is_enriched());
        assert!(by_id["A3"].is_enriched());

        assert_eq!(failures.count_for("A1"), 1);
        assert_eq!(failures.count_for("A2"), 1);
        assert_eq!(failures.entries().len(), 2);
        assert!(failures.entries().iter().any(|e| e.message.contains("parse error")));

        assert_eq!(report.attempted, 4);
        assert_eq!(report.enriched, 2);
        assert_eq!(report.failed, 2);
    }

    #[tokio::test]
    async fn panicking_provider_leaves_record_pending() {
        let provider = Arc::new(PanickingProvider {
            bad_key: "SN1".into(),
        });
        let failures = Arc::new(MemoryFailureLog::new());

        let (done, report) = drain(&pool(2), records(3), provider, failures.clone()).await;

        assert_eq!(done.len(), 3);
        let a1 = done.iter().find(|r| r.asset_id() == "A1").unwrap();
        assert!(!a1.is_enriched());
        assert_eq!(failures.count_for("A1"), 1);
        assert!(failures.entries()[0].message.contains("provider panicked"));
        assert_eq!(report.attempted, 3);
        assert_eq!(report.enriched, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn failure_log_writes_stay_off_the_runtime_thread() {
        let runtime_thread = std::thread::current().id();
        let provider = Arc::new(TableProvider::new(&[]));
        let failures = Arc::new(ThreadTrackingLog::default());
        let queue = Arc::new(TaskQueue::from_records(records(3)));

        pool(2)
            .run(
                queue.clone(),
                provider,
                Arc::new(DateNormalizer::default()),
                failures.clone(),
                Arc::new(SilentProgress),
            )
            .await;

        let threads = failures.threads.lock().unwrap().clone();
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().all(|t| *t != runtime_thread));
        assert!(queue.is_drained());
    }

    #[tokio::test]
    async fn every_record_attempted_exactly_once_for_any_pool_size() {
        let n = 12;
        for size in [1, 2, 5, n, n + 4] {
            let answers: Vec<(String, String)> = (0..n)
                .map(|i| (format!("SN{i}"), "09 Sep 2029".to_string()))
                .collect();
            let answers: Vec<(&str, &str)> =
                answers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let provider = Arc::new(TableProvider::new(&answers));

            let (done, report) = drain(
                &pool(size),
                records(n),
                provider.clone(),
                Arc::new(MemoryFailureLog::new()),
            )
            .await;

            let calls = provider.calls();
            let unique: HashSet<_> = calls.iter().collect();
            assert_eq!(calls.len(), n, "pool_size {size}");
            assert_eq!(unique.len(), n, "pool_size {size}");
            assert_eq!(done.len(), n);
            assert_eq!(report.attempted, n);
            assert!(done.iter().all(Record::is_enriched));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_lookups_run_concurrently() {
        let answers: Vec<(String, String)> = (0..8)
            .map(|i| (format!("SN{i}"), "01 Jan 2030".to_string()))
            .collect();
        let answers: Vec<(&str, &str)> =
            answers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let provider =
            Arc::new(TableProvider::new(&answers).with_delay(Duration::from_millis(200)));

        let (_, report) = drain(
            &pool(8),
            records(8),
            provider,
            Arc::new(MemoryFailureLog::new()),
        )
        .await;

        assert_eq!(report.enriched, 8);
        // Serial execution would take 1.6s.
        assert!(report.elapsed < Duration::from_millis(1200), "{:?}", report.elapsed);
    }

    #[tokio::test]
    async fn stuck_lookup_times_out_without_blocking_others() {
        let provider = Arc::new(StuckProvider {
            stuck_key: "SN1".into(),
        });
        let failures = Arc::new(MemoryFailureLog::new());
        let pool = WorkerPool::new(PoolConfig {
            pool_size: 2,
            lookup_timeout: Duration::from_millis(100),
        })
        .unwrap();

        let (done, report) = drain(&pool, records(6), provider, failures.clone()).await;

        assert_eq!(done.len(), 6);
        assert_eq!(report.enriched, 5);
        assert_eq!(failures.count_for("A1"), 1);
        assert!(failures.entries()[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn empty_queue_returns_immediately() {
        let (done, report) = drain(
            &pool(4),
            Vec::new(),
            Arc::new(TableProvider::new(&[])),
            Arc::new(MemoryFailureLog::new()),
        )
        .await;
        assert!(done.is_empty());
        assert_eq!(report.attempted, 0);
    }
}
