pub mod cli;
pub mod config;

pub use config::{ConfigError, Configuration, PruneConfig, TarsnapConfig};
