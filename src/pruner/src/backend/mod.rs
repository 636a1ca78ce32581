//! Archive store backends.
//!
//! A backend lists archives and deletes them by name. The tarsnap backend
//! drives the `tarsnap` client; the in-memory backend is used by tests and
//! rehearsals.

pub mod memory;
pub mod tarsnap;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use memory::MemoryBackend;
pub use tarsnap::TarsnapBackend;

#[derive(Error, Debug)]
pub enum BackendError {
    /// One or more of the named archives does not exist.
    #[error("archive does not exist: {detail}")]
    NotFound { detail: String },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend request failed: {0}")]
    Other(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl BackendError {
    /// True for the "archive does not exist" condition, which callers treat
    /// as a terminal success rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }
}

/// Remote archive store.
///
/// Implementations must observe `cancel` and abort outstanding work promptly,
/// returning [`BackendError::Cancelled`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Raw catalog: one `<name>\t<YYYY-MM-DD HH:MM:SS>` line per archive.
    async fn list_archives(&self, cancel: &CancellationToken) -> Result<Vec<u8>, BackendError>;

    /// Delete every name in one request. `names` is never empty.
    async fn delete_archives(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), BackendError>;
}
