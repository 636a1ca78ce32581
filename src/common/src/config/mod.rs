use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "thinner.toml";

/// Prefix for environment overrides, e.g. `THINNER__PRUNE__BATCH_SIZE=50`.
pub const ENV_PREFIX: &str = "THINNER__";

/// Selection and deletion settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Print decisions without deleting anything.
    ///
    /// Env: THINNER__PRUNE__DRY_RUN
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Maximum number of archives submitted in one delete request.
    ///
    /// Env: THINNER__PRUNE__BATCH_SIZE
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of delete requests in flight. Tarsnap serializes
    /// operations per account, so anything above 1 only makes sense for
    /// other backends.
    ///
    /// Env: THINNER__PRUNE__CONCURRENCY
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pattern archive names must match to be considered at all.
    ///
    /// Env: THINNER__PRUNE__ARCHIVE_REGEX
    #[serde(default)]
    pub archive_regex: Option<String>,

    /// Read the catalog from this file instead of asking the backend.
    ///
    /// Env: THINNER__PRUNE__CATALOG_FILE
    #[serde(default)]
    pub catalog_file: Option<PathBuf>,

    /// File with one already-deleted archive name per line.
    ///
    /// Env: THINNER__PRUNE__ALREADY_DELETED_FILE
    #[serde(default)]
    pub already_deleted_file: Option<PathBuf>,

    /// Keep a copy of the backend listing in a temp file.
    ///
    /// Env: THINNER__PRUNE__SAVE_LISTING
    #[serde(default = "default_save_listing")]
    pub save_listing: bool,
}

fn default_dry_run() -> bool {
    true
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    1
}

fn default_save_listing() -> bool {
    true
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            dry_run: default_dry_run(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            archive_regex: None,
            catalog_file: None,
            already_deleted_file: None,
            save_listing: default_save_listing(),
        }
    }
}

/// How the `tarsnap` client is invoked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TarsnapConfig {
    /// Program name or path.
    ///
    /// Env: THINNER__TARSNAP__BINARY
    #[serde(default = "default_tarsnap_binary")]
    pub binary: String,

    /// Arguments placed before every command, e.g. `--keyfile /root/tarsnap.key`.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_tarsnap_binary() -> String {
    "tarsnap".to_string()
}

impl Default for TarsnapConfig {
    fn default() -> Self {
        Self {
            binary: default_tarsnap_binary(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub prune: PruneConfig,
    #[serde(default)]
    pub tarsnap: TarsnapConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Path::new(DEFAULT_CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject settings that would make a run meaningless or unsafe.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prune.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.prune.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        match self.prune.archive_regex.as_deref() {
            None | Some("") => return Err(ConfigError::MissingArchiveRegex),
            Some(_) => {}
        }
        if self.tarsnap.binary.is_empty() {
            return Err(ConfigError::MissingBinary);
        }
        Ok(())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("please provide a positive batch size")]
    InvalidBatchSize,

    #[error("please provide a positive concurrency limit")]
    InvalidConcurrency,

    #[error("please provide archive regex")]
    MissingArchiveRegex,

    #[error("tarsnap binary must not be empty")]
    MissingBinary,
}
