//! Line-oriented run report.
//!
//! Each decision and outcome is one stdout line with a stable prefix so the
//! output can be grepped and counted:
//!
//! ```text
//! keep host-2019-01-01	2019-01-01 03:00:00
//! discard host-2019-01-02	2019-01-02 03:00:00
//! gone    host-2019-01-03
//! deleted host-2019-01-02
//! ```

use std::fmt;
use std::io::Write;
use std::sync::Mutex;

use crate::catalog::ArchiveRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine<'a> {
    Keep(&'a ArchiveRecord),
    Discard(&'a ArchiveRecord),
    Gone(&'a str),
    Deleted(&'a str),
}

impl fmt::Display for ReportLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportLine::Keep(record) => write!(f, "keep {record}"),
            ReportLine::Discard(record) => write!(f, "discard {record}"),
            ReportLine::Gone(name) => write!(f, "gone    {name}"),
            ReportLine::Deleted(name) => write!(f, "deleted {name}"),
        }
    }
}

/// Sink for report lines. Lines are emitted as soon as they are known.
pub trait Reporter: Send + Sync {
    fn report(&self, line: &ReportLine<'_>);

    /// Free-form notice on the same channel, e.g. where the listing backup went.
    fn notice(&self, message: &str);
}

/// Writes report lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReporter;

impl StdoutReporter {
    fn write_line(&self, line: impl fmt::Display) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}") {
            tracing::warn!(error = %e, "Failed to write report line");
        }
    }
}

impl Reporter for StdoutReporter {
    fn report(&self, line: &ReportLine<'_>) {
        self.write_line(line);
    }

    fn notice(&self, message: &str) {
        self.write_line(message);
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Lines starting with `prefix` followed by a space.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        let prefix = format!("{prefix} ");
        self.lines()
            .into_iter()
            .filter(|line| line.starts_with(&prefix))
            .collect()
    }

    fn push(&self, line: String) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, line: &ReportLine<'_>) {
        self.push(line.to_string());
    }

    fn notice(&self, message: &str) {
        self.push(message.to_string());
    }
}
