// ABOUTME: The ChangeLedger trait: durable current-state store of pending entity changes.
// ABOUTME: Shared by the recorder (writes) and the package builder (snapshot read and commit).

use changeset_core::{ChangeKind, ChangeRecord, EntityKind, KindError, RecordKey};
use thiserror::Error;

/// Errors that can occur in ledger operations. Any of these means the
/// storage layer could not complete the request.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid ledger row: {0}")]
    InvalidRow(#[from] KindError),

    #[error("invalid change date '{value}': {source}")]
    InvalidDate {
        value: String,
        source: chrono::ParseError,
    },

    #[error("invalid ledger table name: {0}")]
    InvalidTable(String),

    #[error("ledger connection lock poisoned")]
    Poisoned,
}

/// A durable table of pending change records, at most one per (kind, name).
pub trait ChangeLedger: Send + Sync {
    /// Create the backing table if absent. Idempotent.
    fn ensure_schema(&self) -> Result<(), LedgerError>;

    /// Insert a record for (kind, name), or refresh its date and change kind
    /// in place and bump its revision. A single atomic statement, so
    /// concurrent callers never produce duplicates.
    fn upsert(
        &self,
        kind: EntityKind,
        name: &str,
        change_kind: ChangeKind,
    ) -> Result<ChangeRecord, LedgerError>;

    /// Snapshot of every pending record, ordered by kind then name.
    fn read_all(&self) -> Result<Vec<ChangeRecord>, LedgerError>;

    /// Remove every record. Returns the number removed.
    fn clear(&self) -> Result<usize, LedgerError>;

    /// Remove only records whose id and revision still match the given
    /// snapshot keys, in one transaction. Records refreshed since the
    /// snapshot are kept.
    fn remove(&self, keys: &[RecordKey]) -> Result<usize, LedgerError>;

    /// Drop the record for a single (kind, name). Returns whether one existed.
    fn forget(&self, kind: EntityKind, name: &str) -> Result<bool, LedgerError>;

    /// Number of pending records.
    fn len(&self) -> Result<usize, LedgerError>;

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}
