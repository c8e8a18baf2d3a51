// ABOUTME: Core library for changeset, containing entity kinds, change records, and the package model.
// ABOUTME: Defines the host-boundary traits and the XML serializers shared by the store and builder crates.

pub mod entity;
pub mod export;
pub mod host;
pub mod kind;
pub mod package;
pub mod record;

pub use entity::{EntityProperty, LiveEntity};
pub use export::{EntitySerializer, SerializeError, SerializerRegistry};
pub use host::{EntityChangeListener, EntityResolver, ResolveError};
pub use kind::{ChangeKind, EntityKind, KindError};
pub use package::{
    NameError, Package, PackageSection, SECTION_ORDER, Unresolved, default_package_name,
    validate_package_name,
};
pub use record::{ChangeRecord, RecordKey};
