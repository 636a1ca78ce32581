//! thinner
//!
//! Thins out old tarsnap archives: keeps every archive from the last two
//! months, one per week up to two years back and one per month beyond that.
//! Runs in dry-run mode unless told otherwise.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use common::PruneConfig;
use common::cli::utils::{handle_common_command, init_logging, load_config, validate_config};
use common::cli::{CommonArgs, CommonCommands};
use pruner::{RunOptions, RunStatus, Runner, StdoutReporter, TarsnapBackend};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    prune: PruneArgs,

    #[command(subcommand)]
    command: Option<CommonCommands>,
}

/// Flags overriding the `[prune]` configuration section
#[derive(clap::Args, Debug, Clone, Default)]
struct PruneArgs {
    /// Only print keep/discard decisions; `--dry-run=false` deletes
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    dry_run: Option<bool>,

    /// Read the archive catalog from a file instead of running tarsnap
    #[arg(short = 'f', long = "file")]
    catalog_file: Option<PathBuf>,

    #[arg(long, help = "Archives per delete request")]
    batch_size: Option<usize>,

    #[arg(long, help = "Delete requests in flight at once")]
    concurrency: Option<usize>,

    /// File listing archives already deleted, one per line
    #[arg(long)]
    already_deleted_file: Option<PathBuf>,

    /// Only consider archives whose name matches this pattern
    #[arg(long)]
    archive_regex: Option<String>,

    #[arg(long, help = "Do not save the archive listing to a temp file")]
    no_save_listing: bool,
}

impl PruneArgs {
    fn apply(&self, config: &mut PruneConfig) {
        if let Some(dry_run) = self.dry_run {
            config.dry_run = dry_run;
        }
        if let Some(path) = &self.catalog_file {
            config.catalog_file = Some(path.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(path) = &self.already_deleted_file {
            config.already_deleted_file = Some(path.clone());
        }
        if let Some(pattern) = &self.archive_regex {
            config.archive_regex = Some(pattern.clone());
        }
        if self.no_save_listing {
            config.save_listing = false;
        }
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args.common);

    let mut config = load_config(args.common.config.as_ref())?;
    args.prune.apply(&mut config.prune);

    let command = args.command.clone().unwrap_or_default();
    if handle_common_command(&command, &config)? {
        return Ok(ExitCode::SUCCESS);
    }
    validate_config(&config)?;

    let options = RunOptions::from(&config.prune);
    if options.dry_run {
        tracing::info!("Dry run, archives will only be labelled");
    } else {
        tracing::warn!(
            batch_size = options.executor.batch_size,
            concurrency = options.executor.concurrency,
            "Live run, discarded archives will be deleted"
        );
    }

    // A signal stops the run the same way a fatal deletion error does.
    let cancel = CancellationToken::new();
    let signal_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(()) => {
                    tracing::warn!("Shutdown requested, cancelling outstanding deletions");
                    cancel.cancel();
                }
                Err(e) => tracing::error!(error = %e, "Signal handling unavailable"),
            }
        })
    };

    let backend = Arc::new(TarsnapBackend::from_config(&config.tarsnap));
    let runner = Runner::new(backend, Arc::new(StdoutReporter)).with_cancellation(cancel);

    let result = runner.run(&options).await;
    signal_task.abort();
    runner.metrics().summary().log();

    let report = result.context("Prune run aborted")?;
    match report.status {
        RunStatus::Success => Ok(ExitCode::SUCCESS),
        RunStatus::Recovered => {
            tracing::info!("Some archives were already gone and were skipped");
            Ok(ExitCode::SUCCESS)
        }
        RunStatus::Fatal(e) => {
            tracing::error!(error = %e, "Prune run failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_leave_config_untouched() {
        let args = Args::try_parse_from(["thinner"]).unwrap();
        let mut config = PruneConfig::default();
        args.prune.apply(&mut config);

        assert!(config.dry_run);
        assert!(config.save_listing);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_dry_run_flag_forms() {
        let args = Args::try_parse_from(["thinner", "--dry-run=false"]).unwrap();
        assert_eq!(args.prune.dry_run, Some(false));

        let args = Args::try_parse_from(["thinner", "--dry-run"]).unwrap();
        assert_eq!(args.prune.dry_run, Some(true));
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "thinner",
            "--dry-run=false",
            "-f",
            "catalog.txt",
            "--batch-size",
            "10",
            "--archive-regex",
            "host-",
            "--already-deleted-file",
            "deleted.txt",
            "--no-save-listing",
            "run",
        ])
        .unwrap();
        let mut config = PruneConfig::default();
        args.prune.apply(&mut config);

        assert!(!config.dry_run);
        assert_eq!(config.catalog_file, Some(PathBuf::from("catalog.txt")));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.archive_regex.as_deref(), Some("host-"));
        assert_eq!(
            config.already_deleted_file,
            Some(PathBuf::from("deleted.txt"))
        );
        assert!(!config.save_listing);
        assert!(matches!(args.command, Some(CommonCommands::Run)));
    }

    #[test]
    fn test_config_subcommand() {
        let args = Args::try_parse_from(["thinner", "config", "--json"]).unwrap();
        assert!(matches!(
            args.command,
            Some(CommonCommands::Config { json: true })
        ));
    }
}
