//! Tiered retention for archive catalogs.
//!
//! Recent history is kept in full, older history is thinned out:
//!
//! | Tier | Age | Kept |
//! |---|---|---|
//! | recent | < 2 months | every archive |
//! | mid | 2 months – 2 years | one per 7 days |
//! | old | ≥ 2 years | one per 30 days |
//!
//! - `policy`: tier constants and the per-run thresholds
//! - `selector`: the single forward pass that labels each archive
//!
//! ## Usage
//!
//! ```no_run
//! use chrono::Utc;
//! use pruner::removed::AlreadyRemovedSet;
//! use pruner::retention::{RetentionSelector, RetentionThresholds};
//!
//! let records = pruner::catalog::parse_catalog(std::io::Cursor::new(""))?;
//! let removed = AlreadyRemovedSet::new();
//! let thresholds = RetentionThresholds::at(Utc::now())?;
//!
//! let selection = RetentionSelector::new(thresholds, &removed).select(&records);
//! for record in selection.discards() {
//!     println!("would delete {}", record.name);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod policy;
pub mod selector;

pub use policy::{PolicyError, RetentionThresholds, Tier};
pub use selector::{Decision, RetentionSelector, Selection, Verdict};
