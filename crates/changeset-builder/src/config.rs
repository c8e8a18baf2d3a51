// ABOUTME: Configuration loading and validation for the changeset recorder and builder.
// ABOUTME: Reads CHANGESET_* environment variables and derives ledger, output, and catalog locations.

use std::path::PathBuf;
use std::str::FromStr;

use changeset_store::{DEFAULT_TABLE, is_valid_table_name};
use thiserror::Error;

use crate::builder::BuildOptions;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CHANGESET_COMMIT_MODE must be 'snapshot' or 'truncate', got '{0}'")]
    InvalidCommitMode(String),

    #[error("CHANGESET_TABLE is not a plain identifier: {0}")]
    InvalidTable(String),

    #[error("CHANGESET_DELIVERY_LOG must be a file stem without path separators: {0}")]
    InvalidDeliveryLog(String),
}

/// How a successful build removes the records it packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Delete only the records read at the start of the build, and only if
    /// they were not refreshed while it ran.
    #[default]
    Snapshot,
    /// Delete every record. Changes recorded during the build are lost.
    Truncate,
}

impl FromStr for CommitMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" => Ok(CommitMode::Snapshot),
            "truncate" => Ok(CommitMode::Truncate),
            _ => Err(ConfigError::InvalidCommitMode(s.to_string())),
        }
    }
}

/// Recorder and builder configuration.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub home: PathBuf,
    pub ledger_path: PathBuf,
    pub output_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub table: String,
    pub commit_mode: CommitMode,
    pub delivery_log: Option<String>,
    pub no_clobber: bool,
    pub include_partial_views: bool,
}

impl BuilderConfig {
    /// Defaults rooted at `home`: ledger at `changes.db`, packages in
    /// `packages/`, catalog at `catalog.yaml`.
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            ledger_path: home.join("changes.db"),
            output_dir: home.join("packages"),
            catalog_path: home.join("catalog.yaml"),
            home,
            table: DEFAULT_TABLE.to_string(),
            commit_mode: CommitMode::default(),
            delivery_log: None,
            no_clobber: false,
            include_partial_views: false,
        }
    }

    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - CHANGESET_HOME: data directory (default: ~/.changeset)
    /// - CHANGESET_OUTPUT_DIR: package output directory (default: $CHANGESET_HOME/packages)
    /// - CHANGESET_CATALOG: YAML catalog of live entities (default: $CHANGESET_HOME/catalog.yaml)
    /// - CHANGESET_TABLE: ledger table name (default: Chauffeur_Changes)
    /// - CHANGESET_COMMIT_MODE: snapshot | truncate (default: snapshot)
    /// - CHANGESET_DELIVERY_LOG: shared delivery manifest stem (optional)
    /// - CHANGESET_NO_CLOBBER: refuse to overwrite an existing package (default: false)
    /// - CHANGESET_INCLUDE_PARTIAL_VIEWS: package partial views (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| {
            var(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false)
        };

        let home = var("CHANGESET_HOME").map(PathBuf::from).unwrap_or_else(|| {
            var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".changeset")
        });

        let mut config = Self::with_home(home);

        if let Some(dir) = var("CHANGESET_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("CHANGESET_CATALOG") {
            config.catalog_path = PathBuf::from(path);
        }
        if let Some(table) = var("CHANGESET_TABLE") {
            if !is_valid_table_name(&table) {
                return Err(ConfigError::InvalidTable(table));
            }
            config.table = table;
        }
        if let Some(mode) = var("CHANGESET_COMMIT_MODE") {
            config.commit_mode = mode.parse()?;
        }
        if let Some(stem) = var("CHANGESET_DELIVERY_LOG") {
            if stem.contains('/') || stem.contains('\\') || stem.contains("..") {
                return Err(ConfigError::InvalidDeliveryLog(stem));
            }
            config.delivery_log = Some(stem);
        }
        config.no_clobber = flag("CHANGESET_NO_CLOBBER");
        config.include_partial_views = flag("CHANGESET_INCLUDE_PARTIAL_VIEWS");

        Ok(config)
    }

    /// The build options this configuration implies.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            output_dir: self.output_dir.clone(),
            commit_mode: self.commit_mode,
            delivery_log: self.delivery_log.clone(),
            no_clobber: self.no_clobber,
            include_partial_views: self.include_partial_views,
        }
    }
}
