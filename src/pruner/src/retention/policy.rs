//! Retention tiers and the per-run thresholds that separate them.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use std::fmt;
use thiserror::Error;

/// Archives younger than this many months are all kept.
pub const RECENT_MONTHS: u32 = 2;

/// Archives older than this many years are thinned to one per month.
pub const OLD_YEARS: u32 = 2;

/// Window length for archives between the recent and old thresholds.
pub const MID_WINDOW_DAYS: i64 = 7;

/// Window length for archives past the old threshold.
pub const OLD_WINDOW_DAYS: i64 = 30;

/// Age bracket an archive falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Younger than two months: keep everything.
    Recent,
    /// Two months to two years: one per week.
    Mid,
    /// Two years and older: one per 30 days.
    Old,
}

impl Tier {
    /// Window opened by an anchor in this tier, `None` when every archive is kept.
    pub fn window(&self) -> Option<Duration> {
        match self {
            Tier::Recent => None,
            Tier::Mid => Some(Duration::days(MID_WINDOW_DAYS)),
            Tier::Old => Some(Duration::days(OLD_WINDOW_DAYS)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Recent => "recent",
            Tier::Mid => "mid",
            Tier::Old => "old",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("retention threshold {months} months before {now} is out of range")]
    ThresholdOutOfRange { now: DateTime<Utc>, months: u32 },
}

/// Tier boundaries computed once per run.
///
/// Both thresholds sit at UTC midnight on the calendar date the given number
/// of months before `now`, so every run on the same day sees the same
/// boundaries regardless of the time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionThresholds {
    pub now: DateTime<Utc>,
    pub two_months_ago: DateTime<Utc>,
    pub two_years_ago: DateTime<Utc>,
}

impl RetentionThresholds {
    pub fn at(now: DateTime<Utc>) -> Result<Self, PolicyError> {
        Ok(Self {
            now,
            two_months_ago: midnight_months_before(now, RECENT_MONTHS)?,
            two_years_ago: midnight_months_before(now, OLD_YEARS * 12)?,
        })
    }

    /// Tier of an archive created at `timestamp`.
    pub fn tier_of(&self, timestamp: DateTime<Utc>) -> Tier {
        if timestamp < self.two_years_ago {
            Tier::Old
        } else if timestamp < self.two_months_ago {
            Tier::Mid
        } else {
            Tier::Recent
        }
    }

    /// Tier and exclusive end of the window anchored at `anchor`, or `None`
    /// when the anchor opens no window.
    ///
    /// A window must end strictly before the threshold above it. An anchor
    /// too close to the two-year threshold for a 30-day window gets a 7-day
    /// one instead, and an anchor too close to the two-month threshold for
    /// that gets none.
    pub fn window_end(&self, anchor: DateTime<Utc>) -> Option<(Tier, DateTime<Utc>)> {
        [(Tier::Old, self.two_years_ago), (Tier::Mid, self.two_months_ago)]
            .into_iter()
            .find_map(|(tier, threshold)| {
                let end = anchor.checked_add_signed(tier.window()?)?;
                (end < threshold).then_some((tier, end))
            })
    }
}

/// UTC midnight of the date `months` calendar months before `now`.
///
/// Days past the end of the target month roll over into the next month, so
/// 30 April minus two months is 2 March (1 March in leap years).
fn midnight_months_before(now: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>, PolicyError> {
    let out_of_range = || PolicyError::ThresholdOutOfRange { now, months };

    let today = now.date_naive();
    let total = today.year() * 12 + today.month0() as i32 - months as i32;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12));

    let first = NaiveDate::from_ymd_opt(year, month0 as u32 + 1, 1).ok_or_else(out_of_range)?;
    let date = first
        .checked_add_signed(Duration::days(i64::from(today.day()) - 1))
        .ok_or_else(out_of_range)?;

    Ok(date.and_time(NaiveTime::MIN).and_utc())
}
