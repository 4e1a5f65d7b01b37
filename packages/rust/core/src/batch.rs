//! Batch orchestration over a fixed pool of worker tasks.
//!
//! The orchestrator fetches the candidate set once, hands one record to each
//! worker, and gives the next record to whichever worker reports back. Each
//! worker owns its own store handle and expander and shares nothing mutable.
//! The first fatal record failure aborts every worker and ends the batch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use lexenrich_shared::{
    AppConfig, BatchSettings, LexError, LexicalRecord, LlmConfig, RecordStage, Result, StoreConfig,
};
use lexenrich_storage::LexiconStore;

use crate::enrichment::{ChatClient, DescriptionExpander};
use crate::pipeline::{RecordFailure, RecordOutcome, RecordStore, process_record};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Builds the per-worker collaborators. Called once per worker before any
/// record is dispatched, plus once for the candidate fetch.
pub trait WorkerFactory: Send + Sync {
    type Store: RecordStore + 'static;
    type Expander: DescriptionExpander + 'static;

    fn open_store(&self) -> impl Future<Output = Result<Self::Store>> + Send;

    fn build_expander(&self) -> Result<Self::Expander>;
}

/// Progress callbacks, invoked in completion order.
pub trait BatchProgress: Send + Sync {
    /// Called once the candidate set is known.
    fn started(&self, total: usize);
    /// Called when a record completes every stage.
    fn record_done(&self, outcome: &RecordOutcome, completed: usize, total: usize);
    /// Called when a record is skipped over a malformed document.
    fn record_skipped(&self, id: i64, reason: &LexError, completed: usize, total: usize);
    /// Called when the batch completes without a fatal failure.
    fn finished(&self, report: &BatchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn started(&self, _total: usize) {}
    fn record_done(&self, _outcome: &RecordOutcome, _completed: usize, _total: usize) {}
    fn record_skipped(&self, _id: i64, _reason: &LexError, _completed: usize, _total: usize) {}
    fn finished(&self, _report: &BatchReport) {}
}

/// Factory for real runs: a libSQL store handle and a chat client per worker.
#[derive(Clone)]
pub struct LiveWorkerFactory {
    store: StoreConfig,
    llm: LlmConfig,
    api_key: String,
    readonly: bool,
}

impl LiveWorkerFactory {
    pub fn new(config: &AppConfig, api_key: impl Into<String>) -> Self {
        Self {
            store: config.store.clone(),
            llm: config.llm.clone(),
            api_key: api_key.into(),
            readonly: false,
        }
    }

    /// Open every store handle read-only. Used for dry runs.
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }
}

impl WorkerFactory for LiveWorkerFactory {
    type Store = LexiconStore;
    type Expander = ChatClient;

    async fn open_store(&self) -> Result<LexiconStore> {
        if self.readonly {
            LexiconStore::open_readonly(&self.store).await
        } else {
            LexiconStore::open(&self.store).await
        }
    }

    fn build_expander(&self) -> Result<ChatClient> {
        ChatClient::new(&self.llm, self.api_key.clone())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Totals for a completed batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Candidates fetched (`id > start_index`).
    pub candidates: usize,
    /// Records written back (or that would be, in a dry run).
    pub persisted: usize,
    /// Records skipped over malformed documents.
    pub skipped: usize,
    /// Records with no short definition under the source tag.
    pub definitions_not_found: usize,
    /// Updates that matched no row.
    pub zero_row_updates: usize,
    /// Highest id that completed, a safe resume point only when nothing was skipped.
    pub last_id: Option<i64>,
    pub elapsed: Duration,
}

impl BatchReport {
    fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            dry_run,
            candidates: 0,
            persisted: 0,
            skipped: 0,
            definitions_not_found: 0,
            zero_row_updates: 0,
            last_id: None,
            elapsed: Duration::ZERO,
        }
    }

    fn tally(&mut self, outcome: &RecordOutcome) {
        self.persisted += 1;
        if !outcome.definition_found {
            self.definitions_not_found += 1;
        }
        if outcome.rows_affected == Some(0) {
            self.zero_row_updates += 1;
        }
        self.last_id = self.last_id.max(Some(outcome.id));
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

struct WorkerResult {
    worker: usize,
    result: std::result::Result<RecordOutcome, RecordFailure>,
}

async fn worker_loop<S, E>(
    worker: usize,
    store: S,
    expander: E,
    settings: Arc<BatchSettings>,
    mut inbox: mpsc::Receiver<LexicalRecord>,
    results: mpsc::Sender<WorkerResult>,
) where
    S: RecordStore,
    E: DescriptionExpander,
{
    while let Some(record) = inbox.recv().await {
        let result = process_record(record, &store, &expander, &settings).await;
        if results.send(WorkerResult { worker, result }).await.is_err() {
            break;
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Run one batch over every record with `id > settings.start_index`.
///
/// Returns [`LexError::BatchAborted`] naming the record on the first fatal
/// failure. Records persisted before it stay committed.
#[instrument(
    skip_all,
    fields(
        start_index = settings.start_index,
        workers = settings.workers,
        dry_run = settings.dry_run,
    )
)]
pub async fn run_batch<F>(
    settings: &BatchSettings,
    factory: &F,
    progress: &dyn BatchProgress,
) -> Result<BatchReport>
where
    F: WorkerFactory,
{
    if settings.workers == 0 {
        return Err(LexError::validation("worker count must be at least 1"));
    }

    let start = Instant::now();
    let mut report = BatchReport::new(settings.dry_run);
    info!(run_id = %report.run_id, "starting batch");

    // --- Phase 1: Candidates ---
    let records = factory
        .open_store()
        .await?
        .fetch_candidates(settings.start_index)
        .await?;
    let total = records.len();
    report.candidates = total;
    progress.started(total);
    info!(total, "fetched candidate records");

    if total == 0 {
        report.elapsed = start.elapsed();
        progress.finished(&report);
        return Ok(report);
    }

    // --- Phase 2: Worker pool ---
    let pool_size = settings.workers.min(total);
    let shared = Arc::new(settings.clone());
    let (results_tx, mut results_rx) = mpsc::channel::<WorkerResult>(pool_size);
    let mut tasks = JoinSet::new();
    let mut inboxes = Vec::with_capacity(pool_size);
    let mut task_workers = HashMap::with_capacity(pool_size);

    for worker in 0..pool_size {
        let store = factory.open_store().await?;
        let expander = factory.build_expander()?;
        let (tx, rx) = mpsc::channel::<LexicalRecord>(1);
        let handle = tasks.spawn(worker_loop(
            worker,
            store,
            expander,
            Arc::clone(&shared),
            rx,
            results_tx.clone(),
        ));
        task_workers.insert(handle.id(), worker);
        inboxes.push(tx);
    }
    drop(results_tx);

    // --- Phase 3: Dispatch ---
    let mut pending = records.into_iter();
    let mut assigned: Vec<Option<i64>> = vec![None; pool_size];
    let mut in_flight = 0usize;
    let mut completed = 0usize;

    for (worker, inbox) in inboxes.iter().enumerate() {
        let Some(record) = pending.next() else { break };
        assigned[worker] = Some(record.id);
        if inbox.send(record).await.is_err() {
            tasks.abort_all();
            return Err(worker_gone(worker));
        }
        in_flight += 1;
    }

    while in_flight > 0 {
        tokio::select! {
            message = results_rx.recv() => {
                let Some(WorkerResult { worker, result }) = message else {
                    // Every sender is gone, so every worker has exited.
                    let joined = tasks.join_next_with_id().await;
                    tasks.abort_all();
                    return Err(match joined {
                        Some(joined) => worker_failure(joined, &task_workers, &assigned),
                        None => LexError::validation("all workers exited with records in flight"),
                    });
                };
                in_flight -= 1;
                completed += 1;
                assigned[worker] = None;

                match result {
                    Ok(outcome) => {
                        report.tally(&outcome);
                        progress.record_done(&outcome, completed, total);
                    }
                    Err(failure) if !failure.is_fatal() => {
                        error!(
                            id = failure.id,
                            stage = %failure.stage,
                            error = %failure.error,
                            "skipping record"
                        );
                        report.skipped += 1;
                        progress.record_skipped(failure.id, &failure.error, completed, total);
                    }
                    Err(failure) => {
                        tasks.abort_all();
                        error!(
                            id = failure.id,
                            stage = %failure.stage,
                            error = %failure.error,
                            "fatal record failure; batch aborted"
                        );
                        return Err(failure.into_aborted());
                    }
                }

                if let Some(record) = pending.next() {
                    assigned[worker] = Some(record.id);
                    if inboxes[worker].send(record).await.is_err() {
                        tasks.abort_all();
                        return Err(worker_gone(worker));
                    }
                    in_flight += 1;
                }
            }
            Some(joined) = tasks.join_next_with_id() => {
                // Inboxes stay open during dispatch, so any exit here is abnormal.
                tasks.abort_all();
                return Err(worker_failure(joined, &task_workers, &assigned));
            }
        }
    }

    // --- Phase 4: Shutdown ---
    drop(inboxes);
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "worker ended abnormally after the batch finished");
        }
    }

    report.elapsed = start.elapsed();
    info!(
        run_id = %report.run_id,
        persisted = report.persisted,
        skipped = report.skipped,
        not_found = report.definitions_not_found,
        zero_rows = report.zero_row_updates,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "batch complete"
    );
    progress.finished(&report);
    Ok(report)
}

type Joined = std::result::Result<(tokio::task::Id, ()), tokio::task::JoinError>;

/// Turn an abnormal worker exit into the error that ends the batch.
fn worker_failure(
    joined: Joined,
    task_workers: &HashMap<tokio::task::Id, usize>,
    assigned: &[Option<i64>],
) -> LexError {
    let (task_id, message) = match joined {
        Ok((task_id, ())) => (task_id, "exited early".to_string()),
        Err(err) => (err.id(), panic_message(err)),
    };
    let worker = task_workers.get(&task_id).copied().unwrap_or_default();
    let cause = LexError::WorkerPanic { worker, message };
    error!(worker, error = %cause, "worker failed; batch aborted");
    match assigned.get(worker).copied().flatten() {
        // Stage progress is not reported mid-record, so a panic is
        // attributed to the last confirmed stage.
        Some(id) => LexError::BatchAborted {
            id,
            stage: RecordStage::Fetched,
            source: Box::new(cause),
        },
        None => cause,
    }
}

fn worker_gone(worker: usize) -> LexError {
    LexError::WorkerPanic {
        worker,
        message: "inbox closed before dispatch".into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
