//! The prune run loop.
//!
//! One run lists (or reads) the catalog, filters it by name, labels every
//! archive with the retention selector and, in live mode, hands the discards
//! to the deletion executor. Input problems abort the run before anything is
//! deleted; deletion problems come back as a [`RunStatus`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::backend::ArchiveBackend;
use crate::catalog::{ArchiveRecord, parse_catalog};
use crate::executor::{
    DeletionExecutor, ExecutionStatus, ExecutionSummary, ExecutorConfig, ExecutorError,
};
use crate::filter::NameFilter;
use crate::metrics::PruneMetrics;
use crate::removed::AlreadyRemovedSet;
use crate::report::{ReportLine, Reporter};
use crate::retention::{RetentionSelector, RetentionThresholds, Verdict};
use common::PruneConfig;

/// File name prefix of the saved archive listing.
pub const LISTING_PREFIX: &str = "tarsnap-old-archives-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Label archives without deleting anything.
    pub dry_run: bool,
    pub archive_regex: String,
    /// Read the catalog from this file instead of listing the backend.
    pub catalog_file: Option<PathBuf>,
    pub already_deleted_file: Option<PathBuf>,
    /// Keep a copy of the backend listing in a temp file.
    pub save_listing: bool,
    /// Directory for the saved listing; the system temp dir when unset.
    pub listing_dir: Option<PathBuf>,
    pub executor: ExecutorConfig,
}

impl RunOptions {
    pub fn new(archive_regex: impl Into<String>) -> Self {
        Self {
            dry_run: true,
            archive_regex: archive_regex.into(),
            catalog_file: None,
            already_deleted_file: None,
            save_listing: true,
            listing_dir: None,
            executor: ExecutorConfig::default(),
        }
    }
}

impl From<&PruneConfig> for RunOptions {
    fn from(config: &PruneConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            archive_regex: config.archive_regex.clone().unwrap_or_default(),
            catalog_file: config.catalog_file.clone(),
            already_deleted_file: config.already_deleted_file.clone(),
            save_listing: config.save_listing,
            listing_dir: None,
            executor: ExecutorConfig::from(config),
        }
    }
}

/// How a run ended once its input was accepted.
#[derive(Debug)]
pub enum RunStatus {
    Success,
    /// Some batches had to be retried archive by archive, all resolved.
    Recovered,
    Fatal(ExecutorError),
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, RunStatus::Fatal(_))
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub kept: usize,
    pub discarded: usize,
    pub gone: usize,
    /// Deletion counts; `None` for dry runs.
    pub execution: Option<ExecutionSummary>,
    pub listing_path: Option<PathBuf>,
}

pub struct Runner {
    backend: Arc<dyn ArchiveBackend>,
    reporter: Arc<dyn Reporter>,
    metrics: PruneMetrics,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(backend: Arc<dyn ArchiveBackend>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            backend,
            reporter,
            metrics: PruneMetrics::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Share `cancel` with the caller, e.g. to stop on a signal.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn metrics(&self) -> &PruneMetrics {
        &self.metrics
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        self.run_at(options, Utc::now()).await
    }

    /// Run with the retention thresholds computed from `now`.
    pub async fn run_at(&self, options: &RunOptions, now: DateTime<Utc>) -> Result<RunReport> {
        let filter = NameFilter::new(&options.archive_regex)
            .context("Invalid archive name pattern")?;
        let removed = match &options.already_deleted_file {
            Some(path) => AlreadyRemovedSet::load(path)?,
            None => AlreadyRemovedSet::new(),
        };

        let (records, listing_path) = self.load_catalog(options).await?;
        self.metrics.record_listed(records.len());

        let records = filter.apply(records);
        self.metrics.record_matched(records.len());
        tracing::info!(
            pattern = filter.as_str(),
            matched = records.len(),
            "Filtered archive catalog"
        );

        let thresholds = RetentionThresholds::at(now)?;
        tracing::debug!(
            two_months_ago = %thresholds.two_months_ago,
            two_years_ago = %thresholds.two_years_ago,
            "Computed retention thresholds"
        );

        let selection = RetentionSelector::new(thresholds, &removed).select(&records);
        for decision in selection.decisions() {
            self.report_decision(decision.record, decision.verdict, options.dry_run);
        }

        let kept = selection.count(Verdict::Keep);
        let discarded = selection.count(Verdict::Discard);
        let gone = selection.count(Verdict::Gone);
        self.metrics.record_kept(kept);
        self.metrics.record_discarded(discarded);
        tracing::info!(kept, discarded, gone, "Selected archives to discard");

        if options.dry_run {
            tracing::info!(
                would_delete = discarded,
                "Dry run, no archives deleted"
            );
            return Ok(RunReport {
                status: RunStatus::Success,
                kept,
                discarded,
                gone,
                execution: None,
                listing_path,
            });
        }

        let discards = selection
            .discards()
            .map(|record| record.name.clone())
            .collect::<Vec<_>>();
        let executor = DeletionExecutor::new(
            Arc::clone(&self.backend),
            options.executor,
            self.metrics.clone(),
            self.cancel.clone(),
        );
        let execution = executor
            .execute(discards, &removed, self.reporter.as_ref())
            .await;

        let status = match execution.status {
            ExecutionStatus::Completed => RunStatus::Success,
            ExecutionStatus::Recovered => RunStatus::Recovered,
            ExecutionStatus::Failed(error) => RunStatus::Fatal(error),
        };

        Ok(RunReport {
            status,
            kept,
            discarded,
            gone,
            execution: Some(execution.summary),
            listing_path,
        })
    }

    async fn load_catalog(
        &self,
        options: &RunOptions,
    ) -> Result<(Vec<ArchiveRecord>, Option<PathBuf>)> {
        if let Some(path) = &options.catalog_file {
            let contents = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
            let records = parse_catalog(contents.as_slice())
                .with_context(|| format!("Failed to parse catalog file {}", path.display()))?;
            tracing::info!(path = %path.display(), archives = records.len(), "Loaded catalog file");
            return Ok((records, None));
        }

        tracing::info!("Listing archives");
        let listing = self
            .backend
            .list_archives(&self.cancel)
            .await
            .context("Failed to list archives")?;

        let listing_path = if options.save_listing {
            self.save_listing(&listing, options.listing_dir.as_deref())
        } else {
            None
        };

        let records =
            parse_catalog(listing.as_slice()).context("Failed to parse archive listing")?;
        tracing::info!(archives = records.len(), "Listed archives");
        Ok((records, listing_path))
    }

    fn save_listing(&self, listing: &[u8], dir: Option<&Path>) -> Option<PathBuf> {
        match write_listing(listing, dir) {
            Ok(path) => {
                self.reporter
                    .notice(&format!("wrote archive output to {}", path.display()));
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save archive listing");
                None
            }
        }
    }

    fn report_decision(&self, record: &ArchiveRecord, verdict: Verdict, dry_run: bool) {
        match verdict {
            Verdict::Gone => {
                self.reporter.report(&ReportLine::Gone(&record.name));
                self.metrics.record_gone();
            }
            Verdict::Keep if dry_run => self.reporter.report(&ReportLine::Keep(record)),
            Verdict::Discard if dry_run => self.reporter.report(&ReportLine::Discard(record)),
            Verdict::Keep | Verdict::Discard => {
                tracing::debug!(archive = %record.name, timestamp = %record.timestamp, ?verdict, "Labelled archive");
            }
        }
    }
}

fn write_listing(listing: &[u8], dir: Option<&Path>) -> Result<PathBuf> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(LISTING_PREFIX);
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .context("Failed to create listing file")?;

    file.write_all(listing)
        .context("Failed to write listing file")?;
    let (_, path) = file.keep().context("Failed to persist listing file")?;
    Ok(path)
}
