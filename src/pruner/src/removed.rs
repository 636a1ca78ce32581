//! Names of archives known to be gone from earlier runs.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

/// Read-only set of already-removed archive names, built once per run.
#[derive(Debug, Clone, Default)]
pub struct AlreadyRemovedSet {
    names: HashSet<String>,
}

impl AlreadyRemovedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One name per line; blank lines are ignored.
    pub fn parse(contents: &str) -> Self {
        let names = contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { names }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read already-deleted archive list {}",
                path.display()
            )
        })?;
        let set = Self::parse(&contents);
        tracing::info!(
            path = %path.display(),
            names = set.len(),
            "Loaded already-deleted archive list"
        );
        Ok(set)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AlreadyRemovedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_ignores_blank_lines() {
        let set = AlreadyRemovedSet::parse("a\n\nb\n\n");
        assert_eq!(set.len(), 2);
        assert!(set.contains("a"));
        assert!(set.contains("b"));
        assert!(!set.contains(""));
    }

    #[test]
    fn test_parse_handles_crlf() {
        let set = AlreadyRemovedSet::parse("a\r\nb\r\n");
        assert!(set.contains("a"));
        assert!(set.contains("b"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host-2019-01-01").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "host-2019-01-02").unwrap();

        let set = AlreadyRemovedSet::load(file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("host-2019-01-02"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = AlreadyRemovedSet::load(&dir.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("already-deleted"));
    }

    #[test]
    fn test_from_iterator() {
        let set: AlreadyRemovedSet = ["x", "y"].into_iter().collect();
        assert!(set.contains("x"));
        assert!(!set.is_empty());
    }
}
