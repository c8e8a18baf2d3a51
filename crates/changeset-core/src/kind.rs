// ABOUTME: Defines the closed EntityKind and ChangeKind enumerations tracked by the ledger.
// ABOUTME: Owns the single mapping between these enums and their persisted integer codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when an integer code or text label does not name a known kind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KindError {
    #[error("unknown entity kind code: {0}")]
    UnknownEntityCode(i64),

    #[error("unknown change kind code: {0}")]
    UnknownChangeCode(i64),

    #[error("unknown entity kind: {0}")]
    UnknownEntityLabel(String),
}

/// The kinds of host entity whose changes are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    ContentType,
    DataType,
    Template,
    Stylesheet,
    Macro,
    PartialView,
}

impl EntityKind {
    /// Every tracked kind, in persisted-code order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::ContentType,
        EntityKind::DataType,
        EntityKind::Template,
        EntityKind::Stylesheet,
        EntityKind::Macro,
        EntityKind::PartialView,
    ];

    /// The integer code stored in the ledger's EntityType column.
    pub fn code(self) -> i64 {
        match self {
            EntityKind::ContentType => 0,
            EntityKind::DataType => 1,
            EntityKind::Template => 2,
            EntityKind::Stylesheet => 3,
            EntityKind::Macro => 4,
            EntityKind::PartialView => 5,
        }
    }

    /// Inverse of [`EntityKind::code`].
    pub fn from_code(code: i64) -> Result<Self, KindError> {
        match code {
            0 => Ok(EntityKind::ContentType),
            1 => Ok(EntityKind::DataType),
            2 => Ok(EntityKind::Template),
            3 => Ok(EntityKind::Stylesheet),
            4 => Ok(EntityKind::Macro),
            5 => Ok(EntityKind::PartialView),
            other => Err(KindError::UnknownEntityCode(other)),
        }
    }

    /// Human-readable label used in logs and CLI output.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::ContentType => "content-type",
            EntityKind::DataType => "data-type",
            EntityKind::Template => "template",
            EntityKind::Stylesheet => "stylesheet",
            EntityKind::Macro => "macro",
            EntityKind::PartialView => "partial-view",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = KindError;

    /// Accepts `content-type`, `content_type`, `ContentType` and similar
    /// spellings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "contenttype" | "documenttype" => Ok(EntityKind::ContentType),
            "datatype" => Ok(EntityKind::DataType),
            "template" => Ok(EntityKind::Template),
            "stylesheet" => Ok(EntityKind::Stylesheet),
            "macro" => Ok(EntityKind::Macro),
            "partialview" => Ok(EntityKind::PartialView),
            _ => Err(KindError::UnknownEntityLabel(s.to_string())),
        }
    }
}

/// What happened to an entity most recently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Saved,
    Deleted,
}

impl ChangeKind {
    /// The integer code stored in the ledger's ChangeType column.
    pub fn code(self) -> i64 {
        match self {
            ChangeKind::Saved => 0,
            ChangeKind::Deleted => 1,
        }
    }

    /// Inverse of [`ChangeKind::code`].
    pub fn from_code(code: i64) -> Result<Self, KindError> {
        match code {
            0 => Ok(ChangeKind::Saved),
            1 => Ok(ChangeKind::Deleted),
            other => Err(KindError::UnknownChangeCode(other)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChangeKind::Saved => "saved",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_codes_are_stable() {
        let codes: Vec<i64> = EntityKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);

        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_code(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(
            EntityKind::from_code(42),
            Err(KindError::UnknownEntityCode(42))
        );
        assert_eq!(
            ChangeKind::from_code(-1),
            Err(KindError::UnknownChangeCode(-1))
        );
    }

    #[test]
    fn change_codes_match_saved_and_deleted() {
        assert_eq!(ChangeKind::Saved.code(), 0);
        assert_eq!(ChangeKind::Deleted.code(), 1);
        assert_eq!(ChangeKind::from_code(1).unwrap(), ChangeKind::Deleted);
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!(
            "content-type".parse::<EntityKind>().unwrap(),
            EntityKind::ContentType
        );
        assert_eq!(
            "ContentType".parse::<EntityKind>().unwrap(),
            EntityKind::ContentType
        );
        assert_eq!(
            "partial_view".parse::<EntityKind>().unwrap(),
            EntityKind::PartialView
        );
        assert_eq!("MACRO".parse::<EntityKind>().unwrap(), EntityKind::Macro);
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.to_string().parse::<EntityKind>().unwrap(), kind);
        }
    }
}
