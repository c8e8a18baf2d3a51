// ABOUTME: Test utilities for changeset-builder: an in-memory resolver and failure-injecting ledgers.
// ABOUTME: Used in tests to drive builds without a real host and to force storage failures.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use changeset_core::{
    ChangeKind, ChangeRecord, EntityKind, EntityResolver, LiveEntity, RecordKey, ResolveError,
};
use changeset_store::{ChangeLedger, LedgerError};

/// An in-memory resolver holding a fixed set of live entities per kind.
#[derive(Debug, Default)]
pub struct StaticResolver {
    entities: Mutex<BTreeMap<EntityKind, Vec<LiveEntity>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live entity of `kind`.
    pub fn with(self, kind: EntityKind, entity: LiveEntity) -> Self {
        self.insert(kind, entity);
        self
    }

    pub fn insert(&self, kind: EntityKind, entity: LiveEntity) {
        if let Ok(mut entities) = self.entities.lock() {
            entities.entry(kind).or_default().push(entity);
        }
    }
}

impl EntityResolver for StaticResolver {
    fn resolve_all(&self, kind: EntityKind) -> Result<Vec<LiveEntity>, ResolveError> {
        let entities = self.entities.lock().map_err(|_| ResolveError::Failed {
            kind,
            message: "resolver lock poisoned".to_string(),
        })?;
        Ok(entities.get(&kind).cloned().unwrap_or_default())
    }
}

/// A ledger whose every operation fails, standing in for an unreachable database.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrokenLedger;

impl ChangeLedger for BrokenLedger {
    fn ensure_schema(&self) -> Result<(), LedgerError> {
        Err(LedgerError::Poisoned)
    }

    fn upsert(&self, _: EntityKind, _: &str, _: ChangeKind) -> Result<ChangeRecord, LedgerError> {
        Err(LedgerError::Poisoned)
    }

    fn read_all(&self) -> Result<Vec<ChangeRecord>, LedgerError> {
        Err(LedgerError::Poisoned)
    }

    fn clear(&self) -> Result<usize, LedgerError> {
        Err(LedgerError::Poisoned)
    }

    fn remove(&self, _: &[RecordKey]) -> Result<usize, LedgerError> {
        Err(LedgerError::Poisoned)
    }

    fn forget(&self, _: EntityKind, _: &str) -> Result<bool, LedgerError> {
        Err(LedgerError::Poisoned)
    }

    fn len(&self) -> Result<usize, LedgerError> {
        Err(LedgerError::Poisoned)
    }
}

/// Delegates to an inner ledger but fails the commit step (`clear` and
/// `remove`), leaving the inner ledger untouched.
pub struct CommitFailingLedger {
    inner: Arc<dyn ChangeLedger>,
}

impl CommitFailingLedger {
    pub fn new(inner: Arc<dyn ChangeLedger>) -> Self {
        Self { inner }
    }
}

impl ChangeLedger for CommitFailingLedger {
    fn ensure_schema(&self) -> Result<(), LedgerError> {
        self.inner.ensure_schema()
    }

    fn upsert(
        &self,
        kind: EntityKind,
        name: &str,
        change_kind: ChangeKind,
    ) -> Result<ChangeRecord, LedgerError> {
        self.inner.upsert(kind, name, change_kind)
    }

    fn read_all(&self) -> Result<Vec<ChangeRecord>, LedgerError> {
        self.inner.read_all()
    }

    fn clear(&self) -> Result<usize, LedgerError> {
        Err(LedgerError::Poisoned)
    }

    fn remove(&self, _: &[RecordKey]) -> Result<usize, LedgerError> {
        Err(LedgerError::Poisoned)
    }

    fn forget(&self, kind: EntityKind, name: &str) -> Result<bool, LedgerError> {
        self.inner.forget(kind, name)
    }

    fn len(&self) -> Result<usize, LedgerError> {
        self.inner.len()
    }
}
