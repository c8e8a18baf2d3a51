// ABOUTME: Traits at the host boundary: lifecycle listener and per-kind entity resolver.
// ABOUTME: Host integrations implement or call these; the core never depends on a concrete host.

use thiserror::Error;

use crate::entity::LiveEntity;
use crate::kind::EntityKind;

/// Errors a host resolver can report while listing live entities.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("resolver has no source for {0}")]
    Unsupported(EntityKind),

    #[error("resolver failed for {kind}: {message}")]
    Failed { kind: EntityKind, message: String },
}

/// Receives entity lifecycle notifications from the host. Called on whatever
/// thread the host uses to deliver a save or delete, possibly concurrently.
pub trait EntityChangeListener: Send + Sync {
    fn on_saved(&self, kind: EntityKind, name: &str);

    fn on_deleted(&self, kind: EntityKind, name: &str);
}

/// Maps an entity kind to the host's current live entities of that kind.
pub trait EntityResolver: Send + Sync {
    fn resolve_all(&self, kind: EntityKind) -> Result<Vec<LiveEntity>, ResolveError>;
}
