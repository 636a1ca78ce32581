//! Prune run metrics
//!
//! Thread-safe counters shared between the run loop and deletion workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread-safe metrics for tracking a prune run
#[derive(Debug, Clone)]
pub struct PruneMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Archives parsed from the catalog
    archives_listed: AtomicUsize,
    /// Archives matching the name filter
    archives_matched: AtomicUsize,
    archives_kept: AtomicUsize,
    archives_discarded: AtomicUsize,
    /// Archives skipped because they were already removed
    archives_gone: AtomicUsize,
    archives_deleted: AtomicUsize,
    /// Archives the backend reported missing while deleting
    archives_already_gone: AtomicUsize,
    batches_submitted: AtomicUsize,
    /// Batches that were retried one archive at a time
    batches_fallen_back: AtomicUsize,
}

impl Default for PruneMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PruneMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub fn record_listed(&self, count: usize) {
        self.inner
            .archives_listed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_matched(&self, count: usize) {
        self.inner
            .archives_matched
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_kept(&self, count: usize) {
        self.inner.archives_kept.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_discarded(&self, count: usize) {
        self.inner
            .archives_discarded
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_gone(&self) {
        self.inner.archives_gone.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.inner.archives_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_already_gone(&self) {
        self.inner
            .archives_already_gone
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_submitted(&self) {
        self.inner.batches_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_fallback(&self) {
        self.inner
            .batches_fallen_back
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        MetricsSummary {
            listed: load(&self.inner.archives_listed),
            matched: load(&self.inner.archives_matched),
            kept: load(&self.inner.archives_kept),
            discarded: load(&self.inner.archives_discarded),
            gone: load(&self.inner.archives_gone),
            deleted: load(&self.inner.archives_deleted),
            already_gone: load(&self.inner.archives_already_gone),
            batches_submitted: load(&self.inner.batches_submitted),
            batches_fallen_back: load(&self.inner.batches_fallen_back),
        }
    }
}

/// Point-in-time copy of [`PruneMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub listed: usize,
    pub matched: usize,
    pub kept: usize,
    pub discarded: usize,
    pub gone: usize,
    pub deleted: usize,
    pub already_gone: usize,
    pub batches_submitted: usize,
    pub batches_fallen_back: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        tracing::info!(
            listed = self.listed,
            matched = self.matched,
            kept = self.kept,
            discarded = self.discarded,
            gone = self.gone,
            deleted = self.deleted,
            already_gone = self.already_gone,
            batches = self.batches_submitted,
            fallbacks = self.batches_fallen_back,
            "Prune run summary"
        );
    }
}
