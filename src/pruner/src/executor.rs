//! Deletion execution.
//!
//! Discarded archives are grouped into batches of at most `batch_size` names
//! and handed to a pool of `concurrency` workers. Each worker takes one batch
//! at a time from a shared queue and submits it as a single delete request.
//!
//! A batch rejected because one of its archives no longer exists is retried
//! one archive at a time, in batch order, so each name resolves to `Deleted`
//! or `AlreadyGone`. Any other failure is fatal: the shared cancellation token
//! fires, queued batches are never started and in-flight requests are
//! aborted. Batches that already completed stay completed.
//!
//! Outcomes travel back over a channel and are reported as they arrive.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::{ArchiveBackend, BackendError};
use crate::metrics::PruneMetrics;
use crate::removed::AlreadyRemovedSet;
use crate::report::{ReportLine, Reporter};
use common::PruneConfig;

/// Configuration for deletion execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub batch_size: usize,
    /// Maximum number of batches in flight. Must stay at 1 for tarsnap.
    pub concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 1,
        }
    }
}

impl From<&PruneConfig> for ExecutorConfig {
    fn from(config: &PruneConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            concurrency: config.concurrency,
        }
    }
}

/// Names submitted together in one delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionBatch {
    /// 1-based position in dispatch order, for logs.
    pub number: usize,
    pub names: Vec<String>,
}

/// Batches to submit plus the names skipped because they are already gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub batches: Vec<DeletionBatch>,
    pub already_gone: Vec<String>,
}

/// Split `discards` into contiguous batches, leaving out already-removed names.
pub fn form_batches(
    discards: impl IntoIterator<Item = String>,
    removed: &AlreadyRemovedSet,
    batch_size: usize,
) -> BatchPlan {
    let (already_gone, live): (Vec<_>, Vec<_>) = discards
        .into_iter()
        .partition(|name| removed.contains(name));

    let batches = live
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, names)| DeletionBatch {
            number: index + 1,
            names: names.to_vec(),
        })
        .collect();

    BatchPlan {
        batches,
        already_gone,
    }
}

/// Terminal classification of one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Deleted,
    AlreadyGone,
    /// The request carrying this archive failed; holds the backend detail.
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionEvent {
    pub batch: usize,
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("deleting batch {batch} failed: {source}")]
    BatchFailed {
        batch: usize,
        #[source]
        source: BackendError,
    },

    #[error("deleting archive {archive} from batch {batch} failed: {source}")]
    ArchiveFailed {
        batch: usize,
        archive: String,
        #[source]
        source: BackendError,
    },

    #[error("deletion cancelled with {remaining} batches unfinished")]
    Cancelled { remaining: usize },

    #[error("deletion worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Counts for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub deleted: usize,
    pub already_gone: usize,
    pub failed: usize,
    pub batches_submitted: usize,
    pub batches_fallen_back: usize,
    /// Batches never started or abandoned mid-way because of cancellation.
    pub batches_unfinished: usize,
}

#[derive(Debug)]
pub enum ExecutionStatus {
    /// Every batch succeeded as submitted.
    Completed,
    /// Every archive resolved, but some batches needed the one-by-one retry.
    Recovered,
    Failed(ExecutorError),
}

#[derive(Debug)]
pub struct ExecutionReport {
    pub summary: ExecutionSummary,
    pub status: ExecutionStatus,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, ExecutionStatus::Failed(_))
    }
}

/// Runs deletion batches against a backend with bounded concurrency.
pub struct DeletionExecutor {
    backend: Arc<dyn ArchiveBackend>,
    config: ExecutorConfig,
    metrics: PruneMetrics,
    cancel: CancellationToken,
}

impl DeletionExecutor {
    pub fn new(
        backend: Arc<dyn ArchiveBackend>,
        config: ExecutorConfig,
        metrics: PruneMetrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            config,
            metrics,
            cancel,
        }
    }

    /// Delete every name in `discards` that is not already removed.
    pub async fn execute(
        &self,
        discards: Vec<String>,
        removed: &AlreadyRemovedSet,
        reporter: &dyn Reporter,
    ) -> ExecutionReport {
        let plan = form_batches(discards, removed, self.config.batch_size);
        let mut summary = ExecutionSummary::default();

        for name in &plan.already_gone {
            reporter.report(&ReportLine::Gone(name));
            self.metrics.record_already_gone();
            summary.already_gone += 1;
        }

        let total = plan.batches.len();
        if total == 0 {
            return ExecutionReport {
                summary,
                status: ExecutionStatus::Completed,
            };
        }

        let workers_count = self.config.concurrency.clamp(1, total);
        tracing::info!(
            batches = total,
            batch_size = self.config.batch_size,
            workers = workers_count,
            "Starting deletion"
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(plan.batches)));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for id in 0..workers_count {
            let worker = Worker {
                id,
                total,
                backend: Arc::clone(&self.backend),
                queue: Arc::clone(&queue),
                events: events_tx.clone(),
                cancel: self.cancel.clone(),
                metrics: self.metrics.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(events_tx);

        // Closes once every worker has finished and dropped its sender.
        while let Some(event) = events_rx.recv().await {
            self.record(&event, &mut summary, reporter);
        }

        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(stats)) => summary.absorb(&stats),
                Ok(Err((stats, error))) => {
                    summary.absorb(&stats);
                    failure.get_or_insert(error);
                }
                Err(join_error) => {
                    self.cancel.cancel();
                    failure.get_or_insert(ExecutorError::WorkerPanicked(join_error.to_string()));
                }
            }
        }

        summary.batches_unfinished += lock_queue(&queue).len();

        let status = match failure {
            Some(error) => ExecutionStatus::Failed(error),
            None if summary.batches_unfinished > 0 => {
                ExecutionStatus::Failed(ExecutorError::Cancelled {
                    remaining: summary.batches_unfinished,
                })
            }
            None if summary.batches_fallen_back > 0 => ExecutionStatus::Recovered,
            None => ExecutionStatus::Completed,
        };

        tracing::info!(
            deleted = summary.deleted,
            already_gone = summary.already_gone,
            failed = summary.failed,
            batches = summary.batches_submitted,
            fallbacks = summary.batches_fallen_back,
            unfinished = summary.batches_unfinished,
            "Deletion finished"
        );

        ExecutionReport { summary, status }
    }

    fn record(&self, event: &DeletionEvent, summary: &mut ExecutionSummary, reporter: &dyn Reporter) {
        match &event.outcome {
            Outcome::Deleted => {
                reporter.report(&ReportLine::Deleted(&event.name));
                self.metrics.record_deleted();
                summary.deleted += 1;
            }
            Outcome::AlreadyGone => {
                reporter.report(&ReportLine::Gone(&event.name));
                self.metrics.record_already_gone();
                summary.already_gone += 1;
            }
            Outcome::Fatal(detail) => {
                tracing::error!(
                    archive = %event.name,
                    batch = event.batch,
                    error = %detail,
                    "Failed to delete archive"
                );
                summary.failed += 1;
            }
        }
    }
}

impl ExecutionSummary {
    fn absorb(&mut self, stats: &WorkerStats) {
        self.batches_submitted += stats.batches_submitted;
        self.batches_fallen_back += stats.batches_fallen_back;
        self.batches_unfinished += stats.batches_interrupted;
    }
}

#[derive(Debug, Default)]
struct WorkerStats {
    batches_submitted: usize,
    batches_fallen_back: usize,
    batches_interrupted: usize,
}

type BatchQueue = Mutex<VecDeque<DeletionBatch>>;

/// Lock the queue, recovering it if a worker panicked while holding it.
fn lock_queue(queue: &BatchQueue) -> MutexGuard<'_, VecDeque<DeletionBatch>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type WorkerResult = Result<WorkerStats, (WorkerStats, ExecutorError)>;

struct Worker {
    id: usize,
    total: usize,
    backend: Arc<dyn ArchiveBackend>,
    queue: Arc<BatchQueue>,
    events: mpsc::UnboundedSender<DeletionEvent>,
    cancel: CancellationToken,
    metrics: PruneMetrics,
}

impl Worker {
    async fn run(self) -> WorkerResult {
        let mut stats = WorkerStats::default();
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(worker = self.id, "Cancellation observed, stopping");
                break;
            }
            let Some(batch) = self.next_batch() else {
                break;
            };
            if let Err(error) = self.process(&batch, &mut stats).await {
                self.cancel.cancel();
                return Err((stats, error));
            }
        }
        Ok(stats)
    }

    fn next_batch(&self) -> Option<DeletionBatch> {
        lock_queue(&self.queue).pop_front()
    }

    async fn process(
        &self,
        batch: &DeletionBatch,
        stats: &mut WorkerStats,
    ) -> Result<(), ExecutorError> {
        tracing::info!(
            worker = self.id,
            batch = batch.number,
            total_batches = self.total,
            batch_size = batch.names.len(),
            "Submitting deletion batch"
        );
        stats.batches_submitted += 1;
        self.metrics.record_batch_submitted();

        match self.backend.delete_archives(&batch.names, &self.cancel).await {
            Ok(()) => {
                for name in &batch.names {
                    self.emit(batch, name, Outcome::Deleted);
                }
                Ok(())
            }
            Err(error) if error.is_cancelled() => {
                stats.batches_interrupted += 1;
                Ok(())
            }
            Err(error) if error.is_not_found() => {
                tracing::warn!(
                    batch = batch.number,
                    error = %error,
                    "Batch contains missing archives, deleting one by one"
                );
                stats.batches_fallen_back += 1;
                self.metrics.record_batch_fallback();
                self.delete_individually(batch, stats).await
            }
            Err(error) => {
                for name in &batch.names {
                    self.emit(batch, name, Outcome::Fatal(error.to_string()));
                }
                Err(ExecutorError::BatchFailed {
                    batch: batch.number,
                    source: error,
                })
            }
        }
    }

    async fn delete_individually(
        &self,
        batch: &DeletionBatch,
        stats: &mut WorkerStats,
    ) -> Result<(), ExecutorError> {
        for name in &batch.names {
            if self.cancel.is_cancelled() {
                stats.batches_interrupted += 1;
                return Ok(());
            }
            match self
                .backend
                .delete_archives(std::slice::from_ref(name), &self.cancel)
                .await
            {
                Ok(()) => self.emit(batch, name, Outcome::Deleted),
                Err(error) if error.is_not_found() => {
                    self.emit(batch, name, Outcome::AlreadyGone)
                }
                Err(error) if error.is_cancelled() => {
                    stats.batches_interrupted += 1;
                    return Ok(());
                }
                Err(error) => {
                    self.emit(batch, name, Outcome::Fatal(error.to_string()));
                    return Err(ExecutorError::ArchiveFailed {
                        batch: batch.number,
                        archive: name.clone(),
                        source: error,
                    });
                }
            }
        }
        Ok(())
    }

    fn emit(&self, batch: &DeletionBatch, name: &str, outcome: Outcome) {
        let event = DeletionEvent {
            batch: batch.number,
            name: name.to_string(),
            outcome,
        };
        if self.events.send(event).is_err() {
            tracing::debug!(archive = %name, "Outcome receiver dropped");
        }
    }
}
