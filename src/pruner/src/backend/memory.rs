use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{ArchiveBackend, BackendError};
use crate::catalog::ArchiveRecord;

/// In-process archive store.
///
/// Deletes are all-or-nothing like tarsnap's: a request naming any missing
/// archive is rejected with [`BackendError::NotFound`] and deletes nothing.
/// Every request is recorded so tests can assert on exactly what was sent.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct State {
    catalog: Vec<ArchiveRecord>,
    live: HashSet<String>,
    failures: HashMap<String, String>,
    requests: Vec<Vec<String>>,
    list_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `records`, listed in the given order.
    pub fn with_archives(records: impl IntoIterator<Item = ArchiveRecord>) -> Self {
        let backend = Self::new();
        for record in records {
            backend.insert(record);
        }
        backend
    }

    /// Hold every delete request open for `latency`, so overlapping
    /// requests become observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, record: ArchiveRecord) {
        let mut state = self.lock();
        state.live.insert(record.name.clone());
        state.catalog.push(record);
    }

    /// Drop an archive behind the catalog's back, as another client would.
    pub fn remove_silently(&self, name: &str) {
        self.lock().live.remove(name);
    }

    /// Any request naming `name` fails with a non-recoverable error.
    pub fn fail_on(&self, name: impl Into<String>, message: impl Into<String>) {
        self.lock().failures.insert(name.into(), message.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().live.contains(name)
    }

    /// Every delete request received, in arrival order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.lock().requests.clone()
    }

    /// How many times each name appeared in a delete request.
    pub fn attempts(&self, name: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .flatten()
            .filter(|n| n.as_str() == name)
            .count()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the recorded state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply_delete(&self, names: &[String]) -> Result<(), BackendError> {
        let mut state = self.lock();
        if let Some(message) = names.iter().find_map(|n| state.failures.get(n)) {
            return Err(BackendError::Other(message.clone()));
        }
        if let Some(missing) = names.iter().find(|n| !state.live.contains(n.as_str())) {
            return Err(BackendError::NotFound {
                detail: format!("{missing}: Archive does not exist"),
            });
        }
        for name in names {
            state.live.remove(name);
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveBackend for MemoryBackend {
    async fn list_archives(&self, cancel: &CancellationToken) -> Result<Vec<u8>, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let mut state = self.lock();
        state.list_calls += 1;
        let listing = state
            .catalog
            .iter()
            .filter(|record| state.live.contains(&record.name))
            .map(|record| format!("{record}\n"))
            .collect::<String>();
        Ok(listing.into_bytes())
    }

    async fn delete_archives(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        {
            let mut state = self.lock();
            state.requests.push(names.to_vec());
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }

        let cancelled = match self.latency {
            Some(latency) => tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(latency) => false,
            },
            None => false,
        };

        let result = if cancelled {
            Err(BackendError::Cancelled)
        } else {
            self.apply_delete(names)
        };
        self.lock().in_flight -= 1;
        result
    }
}
