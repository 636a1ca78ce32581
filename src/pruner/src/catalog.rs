//! Catalog parsing.
//!
//! The archive lister prints one archive per line as `<name>\t<timestamp>`,
//! with the timestamp in `YYYY-MM-DD HH:MM:SS` (UTC, no zone suffix). The
//! parser turns that text into records sorted oldest first.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::io::BufRead;
use thiserror::Error;

/// Timestamp layout used by the lister, e.g. `2018-04-21 08:55:35`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One archive from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            timestamp,
        }
    }
}

/// Renders the record back in catalog form.
impl fmt::Display for ArchiveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}",
            self.name,
            self.timestamp.format(TIMESTAMP_FORMAT)
        )
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("line {line_number}: wrong number of tabs in line: want 1 got {tabs}: {line:?}")]
    MalformedLine {
        line_number: usize,
        tabs: usize,
        line: String,
    },

    #[error("line {line_number}: invalid timestamp {timestamp:?} in line {line:?}: {source}")]
    InvalidTimestamp {
        line_number: usize,
        timestamp: String,
        line: String,
        #[source]
        source: TimestampError,
    },

    #[error("line {line_number}: duplicate archive name {name:?}")]
    DuplicateName { line_number: usize, name: String },

    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a timestamp field was rejected.
#[derive(Error, Debug)]
pub enum TimestampError {
    #[error("want layout YYYY-MM-DD HH:MM:SS")]
    Layout,

    #[error(transparent)]
    Parse(#[from] chrono::ParseError),
}

/// Parse a full catalog, returning records sorted ascending by timestamp.
///
/// The sort is stable: archives sharing a timestamp keep their input order.
pub fn parse_catalog<R: BufRead>(reader: R) -> Result<Vec<ArchiveRecord>, CatalogError> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let record = parse_line(&line, line_number)?;

        if !seen.insert(record.name.clone()) {
            return Err(CatalogError::DuplicateName {
                line_number,
                name: record.name,
            });
        }
        records.push(record);
    }

    records.sort_by_key(|record| record.timestamp);
    Ok(records)
}

/// Parse a single `<name>\t<timestamp>` line.
pub fn parse_line(line: &str, line_number: usize) -> Result<ArchiveRecord, CatalogError> {
    let tabs = line.matches('\t').count();
    let Some((name, timestamp)) = line.split_once('\t').filter(|_| tabs == 1) else {
        return Err(CatalogError::MalformedLine {
            line_number,
            tabs,
            line: line.to_string(),
        });
    };

    let invalid = |source: TimestampError| CatalogError::InvalidTimestamp {
        line_number,
        timestamp: timestamp.to_string(),
        line: line.to_string(),
        source,
    };

    if !has_timestamp_layout(timestamp) {
        return Err(invalid(TimestampError::Layout));
    }
    let parsed = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|e| invalid(e.into()))?;

    Ok(ArchiveRecord::new(name, parsed.and_utc()))
}

/// Exactly `YYYY-MM-DD HH:MM:SS`: zero-padded digits, no surrounding space.
fn has_timestamp_layout(timestamp: &str) -> bool {
    const SEPARATORS: [(usize, u8); 5] = [(4, b'-'), (7, b'-'), (10, b' '), (13, b':'), (16, b':')];

    let bytes = timestamp.as_bytes();
    bytes.len() == 19
        && bytes.iter().enumerate().all(|(i, &b)| {
            match SEPARATORS.iter().find(|(at, _)| *at == i) {
                Some((_, sep)) => b == *sep,
                None => b.is_ascii_digit(),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::{self, Cursor, Read};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_parses_and_sorts_by_timestamp() {
        let input = "host-b\t2019-01-02 00:00:00\nhost-a\t2018-04-21 08:55:35\n";
        let records = parse_catalog(Cursor::new(input)).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "host-a");
        assert_eq!(records[0].timestamp, ts(2018, 4, 21, 8, 55, 35));
        assert_eq!(records[1].name, "host-b");
    }

    #[test]
    fn test_sort_is_stable_for_equal_timestamps() {
        let input = "z\t2020-05-05 12:00:00\n\
                     a\t2020-05-05 12:00:00\n\
                     m\t2020-05-04 12:00:00\n\
                     b\t2020-05-05 12:00:00\n";
        let records = parse_catalog(Cursor::new(input)).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(names, vec!["m", "z", "a", "b"]);
    }

    #[test]
    fn test_accepts_crlf_line_endings() {
        let input = "a\t2020-05-05 12:00:00\r\nb\t2020-05-06 12:00:00\r\n";
        let records = parse_catalog(Cursor::new(input)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].timestamp, ts(2020, 5, 6, 12, 0, 0));
    }

    #[test]
    fn test_missing_tab_reports_line_text() {
        let input = "good\t2020-05-05 12:00:00\nno-tab-here 2020-05-05\n";
        let err = parse_catalog(Cursor::new(input)).unwrap_err();

        match &err {
            CatalogError::MalformedLine {
                line_number,
                tabs,
                line,
            } => {
                assert_eq!(*line_number, 2);
                assert_eq!(*tabs, 0);
                assert_eq!(line, "no-tab-here 2020-05-05");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("no-tab-here 2020-05-05"));
        assert!(message.contains("want 1 got 0"));
    }

    #[test]
    fn test_extra_tab_is_malformed() {
        let err = parse_line("a\tb\t2020-05-05 12:00:00", 1).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedLine { tabs: 2, .. }));
        assert!(err.to_string().contains("want 1 got 2"));
    }

    #[test]
    fn test_blank_line_is_malformed() {
        let err = parse_catalog(Cursor::new("a\t2020-05-05 12:00:00\n\nb\t2020-05-06 12:00:00\n"))
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::MalformedLine {
                line_number: 2,
                tabs: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let err = parse_line("a\t2020/05/05 12:00", 3).unwrap_err();
        match err {
            CatalogError::InvalidTimestamp {
                line_number,
                timestamp,
                line,
                ..
            } => {
                assert_eq!(line_number, 3);
                assert_eq!(timestamp, "2020/05/05 12:00");
                assert_eq!(line, "a\t2020/05/05 12:00");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unpadded_timestamp_is_rejected() {
        let err = parse_line("a\t2020-5-5 1:2:3", 1).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::InvalidTimestamp {
                source: TimestampError::Layout,
                ..
            }
        ));
        assert!(err.to_string().contains("2020-5-5 1:2:3"));
    }

    #[test]
    fn test_padded_or_suffixed_timestamp_is_rejected() {
        for line in [
            "a\t 2020-05-05 12:00:00",
            "a\t2020-05-05 12:00:00 ",
            "a\t2020-05-05T12:00:00",
            "a\t2020-05-05 12:00:00.5",
        ] {
            let err = parse_line(line, 1).unwrap_err();
            assert!(
                matches!(err, CatalogError::InvalidTimestamp { .. }),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn test_impossible_date_is_rejected() {
        let err = parse_line("a\t2021-02-30 12:00:00", 1).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::InvalidTimestamp {
                source: TimestampError::Parse(_),
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let input = "a\t2020-05-05 12:00:00\na\t2020-05-06 12:00:00\n";
        let err = parse_catalog(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateName { line_number: 2, .. }));
    }

    #[test]
    fn test_empty_input_yields_empty_catalog() {
        let records = parse_catalog(Cursor::new("")).unwrap();
        assert!(records.is_empty());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn test_read_failure_is_io_error() {
        let err = parse_catalog(io::BufReader::new(FailingReader)).unwrap_err();
        assert!(matches!(err, CatalogError::Io(_)));
    }

    #[test]
    fn test_display_round_trips_catalog_line() {
        let line = "host-a\t2018-04-21 08:55:35";
        let record = parse_line(line, 1).unwrap();
        assert_eq!(record.to_string(), line);
    }
}
