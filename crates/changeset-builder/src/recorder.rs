// ABOUTME: Adapts host save/delete notifications into change records applied to the ledger.
// ABOUTME: Ignores untracked kinds and never fails the host's request on a storage error.

use std::collections::BTreeSet;
use std::sync::Arc;

use changeset_core::{ChangeKind, ChangeRecord, EntityChangeListener, EntityKind};
use changeset_store::{ChangeLedger, LedgerError};

/// Records entity changes into a shared ledger. Runs synchronously on the
/// notifying thread; cheap to share behind an `Arc` across host callbacks.
pub struct ChangeRecorder {
    ledger: Arc<dyn ChangeLedger>,
    tracked: BTreeSet<EntityKind>,
}

impl ChangeRecorder {
    /// A recorder tracking every entity kind.
    pub fn new(ledger: Arc<dyn ChangeLedger>) -> Self {
        Self::with_tracked(ledger, EntityKind::ALL)
    }

    /// A recorder that only tracks the given kinds.
    pub fn with_tracked(
        ledger: Arc<dyn ChangeLedger>,
        kinds: impl IntoIterator<Item = EntityKind>,
    ) -> Self {
        Self {
            ledger,
            tracked: kinds.into_iter().collect(),
        }
    }

    pub fn tracks(&self, kind: EntityKind) -> bool {
        self.tracked.contains(&kind)
    }

    /// Record one change. Returns `Ok(None)` when the notification is
    /// ignored (untracked kind or blank name).
    pub fn record(
        &self,
        kind: EntityKind,
        name: &str,
        change_kind: ChangeKind,
    ) -> Result<Option<ChangeRecord>, LedgerError> {
        if !self.tracks(kind) {
            tracing::debug!(kind = %kind, entity = name, "ignoring change for untracked kind");
            return Ok(None);
        }
        if name.trim().is_empty() {
            tracing::warn!(
                kind = %kind,
                action = %change_kind,
                "ignoring change with blank entity name"
            );
            return Ok(None);
        }

        let record = self.ledger.upsert(kind, name, change_kind)?;
        tracing::info!(
            kind = %kind,
            entity = name,
            action = %change_kind,
            "entity change recorded"
        );
        Ok(Some(record))
    }

    /// Raw host entry point taking the host's integer kind code. Codes that
    /// name no known kind are ignored.
    pub fn notify(&self, kind_code: i64, name: &str, change_kind: ChangeKind) {
        match EntityKind::from_code(kind_code) {
            Ok(kind) => self.handle(kind, name, change_kind),
            Err(e) => tracing::debug!(entity = name, "ignoring notification: {}", e),
        }
    }

    fn handle(&self, kind: EntityKind, name: &str, change_kind: ChangeKind) {
        if let Err(e) = self.record(kind, name, change_kind) {
            tracing::error!(
                kind = %kind,
                entity = name,
                action = %change_kind,
                "failed to record entity change: {}",
                e
            );
        }
    }
}

impl EntityChangeListener for ChangeRecorder {
    fn on_saved(&self, kind: EntityKind, name: &str) {
        self.handle(kind, name, ChangeKind::Saved);
    }

    fn on_deleted(&self, kind: EntityKind, name: &str) {
        self.handle(kind, name, ChangeKind::Deleted);
    }
}
