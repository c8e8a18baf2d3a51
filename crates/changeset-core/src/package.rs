// ABOUTME: Defines the Package model: a named, ordered set of per-kind sections of live entities.
// ABOUTME: Also owns package naming: the timestamp default and validation of operator names.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use crate::entity::LiveEntity;
use crate::kind::EntityKind;
use crate::record::ChangeRecord;

/// Section order of a built package. Partial views are tracked by the ledger
/// but only packaged when a build opts in, after every other section.
pub const SECTION_ORDER: [EntityKind; 5] = [
    EntityKind::ContentType,
    EntityKind::DataType,
    EntityKind::Template,
    EntityKind::Macro,
    EntityKind::Stylesheet,
];

/// Errors for operator-supplied package names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("package name is empty")]
    Empty,

    #[error("package name must not contain path separators or '..': {0}")]
    PathLike(String),
}

/// The default package name for the given local time: `yyyyMMdd_hhmm-Changes`,
/// with a 12-hour clock hour.
pub fn default_package_name_at(at: NaiveDateTime) -> String {
    format!("{}-Changes", at.format("%Y%m%d_%I%M"))
}

/// The default package name for the current local time.
pub fn default_package_name() -> String {
    default_package_name_at(Local::now().naive_local())
}

/// Validate an operator-supplied name. The name becomes a file stem in the
/// output directory, so it must stay inside it.
pub fn validate_package_name(name: &str) -> Result<String, NameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed.contains("..") {
        return Err(NameError::PathLike(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// All resolved entities of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSection {
    pub kind: EntityKind,
    pub entities: Vec<LiveEntity>,
}

/// A name that was in the ledger but had no live entity at build time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Unresolved {
    pub kind: EntityKind,
    pub name: String,
}

/// An immutable, built package. Holds no reference back to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub sections: Vec<PackageSection>,
    pub unresolved: Vec<Unresolved>,
    pub noted_deletions: Vec<ChangeRecord>,
}

impl Package {
    /// Assemble a package from resolved entities. Sections follow `order`;
    /// kinds absent from `order` or with no entities produce no section.
    pub fn assemble(
        name: String,
        mut resolved: BTreeMap<EntityKind, Vec<LiveEntity>>,
        order: &[EntityKind],
    ) -> Self {
        let sections = order
            .iter()
            .filter_map(|kind| {
                resolved
                    .remove(kind)
                    .filter(|entities| !entities.is_empty())
                    .map(|entities| PackageSection {
                        kind: *kind,
                        entities,
                    })
            })
            .collect();

        Self {
            name,
            sections,
            unresolved: Vec::new(),
            noted_deletions: Vec::new(),
        }
    }

    /// The section for `kind`, if the package has one.
    pub fn section(&self, kind: EntityKind) -> Option<&PackageSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Total number of entities across all sections.
    pub fn entity_count(&self) -> usize {
        self.sections.iter().map(|s| s.entities.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
