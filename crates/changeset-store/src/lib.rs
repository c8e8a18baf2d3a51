// ABOUTME: Persistence layer for changeset, holding the pending-change ledger and build outputs.
// ABOUTME: Provides the ChangeLedger trait, its SQLite implementation, artifact writes, and the delivery manifest.

pub mod artifact;
pub mod ledger;
pub mod manifest;
pub mod sqlite;

pub use artifact::{ArtifactError, artifact_path, write_artifact};
pub use ledger::{ChangeLedger, LedgerError};
pub use manifest::{DeliveryManifest, ManifestError};
pub use sqlite::{DEFAULT_TABLE, SqliteLedger, is_valid_table_name};
