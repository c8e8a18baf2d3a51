// ABOUTME: Defines ChangeRecord, the ledger's current-state row for one (kind, name) pair.
// ABOUTME: Also defines RecordKey, the snapshot identity used to commit only what a build read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::{ChangeKind, EntityKind};

/// The pending change state of a single entity. The ledger holds at most one
/// record per (kind, name); later notifications refresh it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: i64,
    pub kind: EntityKind,
    pub name: String,
    pub change_date: DateTime<Utc>,
    pub change_kind: ChangeKind,
    /// Bumped by every refresh of the row, starting at 0 on insert.
    pub revision: i64,
}

impl ChangeRecord {
    /// The snapshot key of this record as it was read.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            id: self.id,
            revision: self.revision,
        }
    }
}

/// Identifies a record exactly as a build observed it. A conditional commit
/// deletes a row only if its revision still matches, so a notification that
/// lands mid-build keeps its row even when the clock has not moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub id: i64,
    pub revision: i64,
}
