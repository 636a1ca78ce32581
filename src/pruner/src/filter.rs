//! Archive name filter.

use regex::Regex;
use thiserror::Error;

use crate::catalog::ArchiveRecord;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("please provide archive regex")]
    Empty,

    #[error("invalid archive regex {pattern:?}: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled archive name pattern.
///
/// A pattern without an explicit `^` or `$` is padded with `.*` on that side
/// and then anchored, so `daily` matches any name containing `daily` while
/// `^daily$` matches that exact name only.
#[derive(Debug, Clone)]
pub struct NameFilter {
    regex: Regex,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        if pattern.is_empty() {
            return Err(FilterError::Empty);
        }
        let anchored = anchor(pattern);
        let regex = Regex::new(&anchored).map_err(|source| FilterError::Invalid {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Keep only records whose names match, preserving order.
    pub fn apply(&self, records: Vec<ArchiveRecord>) -> Vec<ArchiveRecord> {
        records
            .into_iter()
            .filter(|record| self.matches(&record.name))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

fn anchor(pattern: &str) -> String {
    let mut anchored = String::with_capacity(pattern.len() + 6);
    if !pattern.starts_with('^') {
        anchored.push_str("^.*");
    }
    anchored.push_str(pattern);
    if !pattern.ends_with('$') {
        anchored.push_str(".*$");
    }
    anchored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_unanchored_pattern_matches_substring() {
        let filter = NameFilter::new("daily").unwrap();
        assert_eq!(filter.as_str(), "^.*daily.*$");
        assert!(filter.matches("host-daily-2020-01-01"));
        assert!(filter.matches("daily"));
        assert!(!filter.matches("host-weekly"));
    }

    #[test]
    fn test_explicit_anchors_are_respected() {
        let filter = NameFilter::new("^host-").unwrap();
        assert_eq!(filter.as_str(), "^host-.*$");
        assert!(filter.matches("host-2020"));
        assert!(!filter.matches("otherhost-2020"));

        let exact = NameFilter::new("^host$").unwrap();
        assert!(exact.matches("host"));
        assert!(!exact.matches("host-1"));
    }

    #[test]
    fn test_empty_pattern_is_rejected() {
        assert!(matches!(NameFilter::new(""), Err(FilterError::Empty)));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = NameFilter::new("host-(").unwrap_err();
        assert!(matches!(err, FilterError::Invalid { .. }));
        assert!(err.to_string().contains("host-("));
    }

    #[test]
    fn test_apply_preserves_order() {
        let now = Utc::now();
        let records = vec![
            ArchiveRecord::new("web-1", now),
            ArchiveRecord::new("db-1", now),
            ArchiveRecord::new("web-2", now),
        ];
        let kept = NameFilter::new("^web").unwrap().apply(records);
        let names: Vec<_> = kept.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["web-1", "web-2"]);
    }
}
