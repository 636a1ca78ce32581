//! Single-pass keep/discard selection.
//!
//! The selector walks the catalog oldest first. Each kept archive anchors a
//! window whose length depends on its tier; every archive that starts before
//! the window ends is discarded, and the first one at or past the end becomes
//! the next anchor. Windows never reach the next tier's threshold (see
//! [`RetentionThresholds::window_end`]), so recent archives are all kept.
//! Already-removed archives are reported as gone and otherwise ignored: they
//! never anchor, close or extend a window.

use chrono::{DateTime, Utc};

use super::policy::{RetentionThresholds, Tier};
use crate::catalog::ArchiveRecord;
use crate::removed::AlreadyRemovedSet;

/// Outcome for one archive in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Discard,
    /// Listed in the already-removed set; neither kept nor discarded.
    Gone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision<'a> {
    pub record: &'a ArchiveRecord,
    pub verdict: Verdict,
    /// Tier of the window the record was judged against, or the record's own
    /// tier when it opened no window. `None` for gone records.
    pub tier: Option<Tier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingAnchor,
    InWindow { tier: Tier, end: DateTime<Utc> },
}

/// Result of a selection pass, one decision per input record in input order.
#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    decisions: Vec<Decision<'a>>,
}

impl<'a> Selection<'a> {
    pub fn decisions(&self) -> &[Decision<'a>] {
        &self.decisions
    }

    /// Discarded records, oldest first.
    pub fn discards(&self) -> impl Iterator<Item = &'a ArchiveRecord> + '_ {
        self.by_verdict(Verdict::Discard)
    }

    pub fn kept(&self) -> impl Iterator<Item = &'a ArchiveRecord> + '_ {
        self.by_verdict(Verdict::Keep)
    }

    pub fn gone(&self) -> impl Iterator<Item = &'a ArchiveRecord> + '_ {
        self.by_verdict(Verdict::Gone)
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.decisions
            .iter()
            .filter(|decision| decision.verdict == verdict)
            .count()
    }

    fn by_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &'a ArchiveRecord> + '_ {
        self.decisions
            .iter()
            .filter(move |decision| decision.verdict == verdict)
            .map(|decision| decision.record)
    }
}

#[derive(Debug, Clone)]
pub struct RetentionSelector<'r> {
    thresholds: RetentionThresholds,
    removed: &'r AlreadyRemovedSet,
}

impl<'r> RetentionSelector<'r> {
    pub fn new(thresholds: RetentionThresholds, removed: &'r AlreadyRemovedSet) -> Self {
        Self {
            thresholds,
            removed,
        }
    }

    /// Label every record. `records` must be sorted ascending by timestamp,
    /// which [`crate::catalog::parse_catalog`] guarantees.
    pub fn select<'a>(&self, records: &'a [ArchiveRecord]) -> Selection<'a> {
        debug_assert!(
            records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "catalog must be sorted by timestamp"
        );

        let mut state = State::SeekingAnchor;
        let mut decisions = Vec::with_capacity(records.len());

        for record in records {
            if self.removed.contains(&record.name) {
                decisions.push(Decision {
                    record,
                    verdict: Verdict::Gone,
                    tier: None,
                });
                continue;
            }

            let decision = match state {
                State::InWindow { tier, end } if record.timestamp < end => Decision {
                    record,
                    verdict: Verdict::Discard,
                    tier: Some(tier),
                },
                _ => {
                    let tier = match self.thresholds.window_end(record.timestamp) {
                        Some((tier, end)) => {
                            state = State::InWindow { tier, end };
                            tier
                        }
                        None => {
                            state = State::SeekingAnchor;
                            self.thresholds.tier_of(record.timestamp)
                        }
                    };
                    Decision {
                        record,
                        verdict: Verdict::Keep,
                        tier: Some(tier),
                    }
                }
            };
            decisions.push(decision);
        }

        Selection { decisions }
    }
}
