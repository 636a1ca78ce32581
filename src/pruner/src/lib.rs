//! Tiered-retention thinning for backup archive catalogs.
//!
//! A run parses the archive catalog, keeps the archives a name pattern
//! selects, and labels each one keep or discard so that recent history is
//! kept in full and older history is thinned to one archive per week or per
//! month. Discards are then deleted in batches, or only printed in dry-run
//! mode.
//!
//! - [`catalog`]: parses `<name>\t<timestamp>` listings into sorted records
//! - [`filter`]: auto-anchored name pattern
//! - [`removed`]: archives known to be deleted already
//! - [`retention`]: tier thresholds and the keep/discard selector
//! - [`executor`]: batched deletion with a bounded worker pool
//! - [`backend`]: the tarsnap client and an in-memory store
//! - [`runner`]: ties the pieces into one run

pub mod backend;
pub mod catalog;
pub mod executor;
pub mod filter;
pub mod metrics;
pub mod removed;
pub mod report;
pub mod retention;
pub mod runner;

pub use backend::{ArchiveBackend, BackendError, MemoryBackend, TarsnapBackend};
pub use catalog::{ArchiveRecord, CatalogError};
pub use executor::{DeletionExecutor, ExecutorConfig, ExecutorError};
pub use metrics::{MetricsSummary, PruneMetrics};
pub use report::{MemoryReporter, ReportLine, Reporter, StdoutReporter};
pub use runner::{RunOptions, RunReport, RunStatus, Runner};
