use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared by every thinner entry point
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that never touch the archive store
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Select archives and delete the discarded ones (default behavior)
    #[default]
    Run,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments. `RUST_LOG` wins when set.
    ///
    /// Logs go to stderr; stdout is reserved for the decision report.
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            let prune = &config.prune;
            println!("Thinner Configuration:");
            println!("======================");
            println!("Dry run: {}", prune.dry_run);
            println!("Batch size: {}", prune.batch_size);
            println!("Concurrency: {}", prune.concurrency);
            println!(
                "Archive regex: {}",
                prune.archive_regex.as_deref().unwrap_or("<unset>")
            );
            match &prune.catalog_file {
                Some(path) => println!("Catalog: {}", path.display()),
                None => println!("Catalog: {} --list-archives -v", config.tarsnap.binary),
            }
            match &prune.already_deleted_file {
                Some(path) => println!("Already deleted list: {}", path.display()),
                None => println!("Already deleted list: none"),
            }
            println!("Save listing: {}", prune.save_listing);
            println!("Tarsnap binary: {}", config.tarsnap.binary);
            if !config.tarsnap.extra_args.is_empty() {
                println!("Tarsnap extra args: {}", config.tarsnap.extra_args.join(" "));
            }
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate().context("Invalid configuration")?;
        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle commands that don't require a run. Returns `true` when handled.
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Run => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    #[test]
    fn test_common_commands_default() {
        let default_cmd = CommonCommands::default();
        assert!(matches!(default_cmd, CommonCommands::Run));
    }

    #[test]
    fn test_version_info() {
        let version = utils::version_info();
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_run_is_not_handled() {
        let config = Configuration::default();
        let handled = utils::handle_common_command(&CommonCommands::Run, &config).unwrap();
        assert!(!handled);
    }

    #[test]
    fn test_validate_command_surfaces_errors() {
        let config = Configuration::default();
        assert!(utils::handle_common_command(&CommonCommands::Validate, &config).is_err());
    }
}
