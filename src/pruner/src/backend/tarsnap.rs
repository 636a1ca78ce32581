//! Backend driving the `tarsnap` command line client.
//!
//! Tarsnap serializes operations per account: never run two of these
//! commands at once against the same key.

use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{ArchiveBackend, BackendError};
use common::TarsnapConfig;

/// Marker tarsnap prints when asked to delete a missing archive.
const NOT_FOUND_MARKER: &str = "Archive does not exist";

#[derive(Debug, Clone)]
pub struct TarsnapBackend {
    binary: String,
    extra_args: Vec<String>,
}

impl TarsnapBackend {
    pub fn new(binary: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args,
        }
    }

    pub fn from_config(config: &TarsnapConfig) -> Self {
        Self::new(config.binary.clone(), config.extra_args.clone())
    }

    fn delete_args(names: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(names.len() * 2 + 1);
        args.push("-d".to_string());
        for name in names {
            args.push("-f".to_string());
            args.push(name.clone());
        }
        args
    }

    /// Run the client to completion, killing it if `cancel` fires first.
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<Output, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        tracing::debug!(program = %self.binary, ?args, "Running tarsnap");

        let child = Command::new(&self.binary)
            .args(&self.extra_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(program = %self.binary, "Cancelled, killing tarsnap");
                Err(BackendError::Cancelled)
            }
            output = child.wait_with_output() => output.map_err(|source| BackendError::Spawn {
                program: self.binary.clone(),
                source,
            }),
        }
    }

    fn failure(&self, output: &Output) -> BackendError {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains(NOT_FOUND_MARKER) {
            BackendError::NotFound { detail: stderr }
        } else {
            BackendError::CommandFailed {
                program: self.binary.clone(),
                status: output.status.to_string(),
                stderr,
            }
        }
    }

    fn forward_stderr(&self, output: &Output) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            tracing::warn!(program = %self.binary, %stderr, "tarsnap wrote to stderr");
        }
    }
}

#[async_trait]
impl ArchiveBackend for TarsnapBackend {
    async fn list_archives(&self, cancel: &CancellationToken) -> Result<Vec<u8>, BackendError> {
        let args = ["--list-archives".to_string(), "-v".to_string()];
        let output = self.run(&args, cancel).await?;
        if !output.status.success() {
            return Err(self.failure(&output));
        }
        self.forward_stderr(&output);
        Ok(output.stdout)
    }

    async fn delete_archives(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        let output = self.run(&Self::delete_args(names), cancel).await?;
        if !output.status.success() {
            return Err(self.failure(&output));
        }
        self.forward_stderr(&output);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Backend whose "tarsnap" is a shell snippet; tarsnap arguments land in `$@`.
    fn scripted(script: &str) -> TarsnapBackend {
        TarsnapBackend::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delete_args_layout() {
        assert_eq!(
            TarsnapBackend::delete_args(&names(&["a", "b"])),
            names(&["-d", "-f", "a", "-f", "b"])
        );
    }

    #[tokio::test]
    async fn test_list_archives_returns_stdout() {
        let backend = scripted(r#"echo "$@""#);
        let out = backend
            .list_archives(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "--list-archives -v\n");
    }

    #[tokio::test]
    async fn test_delete_success() {
        let backend = scripted(r#"test "$1" = "-d" && test "$3" = "host-1""#);
        backend
            .delete_archives(&names(&["host-1"]), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_archive_is_not_found() {
        let backend = scripted(r#"echo "tarsnap: Archive does not exist" >&2; exit 1"#);
        let err = backend
            .delete_archives(&names(&["a", "b"]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_other_failure_carries_stderr() {
        let backend = scripted(r#"echo "tarsnap: Cannot obtain server key" >&2; exit 1"#);
        let err = backend
            .delete_archives(&names(&["a"]), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            BackendError::CommandFailed { stderr, .. } => {
                assert_eq!(stderr, "tarsnap: Cannot obtain server key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let backend = TarsnapBackend::new("/nonexistent/tarsnap", Vec::new());
        let err = backend
            .list_archives(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_kills_running_command() {
        let backend = scripted("sleep 30");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = backend
            .delete_archives(&names(&["a"]), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_spawn() {
        let backend = TarsnapBackend::new("/nonexistent/tarsnap", Vec::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = backend.list_archives(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
