// ABOUTME: Recording and packaging layer for changeset, wiring host events to the ledger and builds to disk.
// ABOUTME: Exposes the ChangeRecorder, PackageBuilder, environment configuration, and the YAML catalog resolver.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod recorder;
pub mod testing;

pub use builder::{
    BuildError, BuildOptions, BuildOutcome, BuildPhase, BuildReport, BuildRequest, CancelFlag,
    PackageBuilder,
};
pub use catalog::{Catalog, CatalogError, CatalogResolver};
pub use config::{BuilderConfig, CommitMode, ConfigError};
pub use recorder::ChangeRecorder;
