// ABOUTME: YAML catalog of live host entities, used as a resolver when no host is attached.
// ABOUTME: Lists entities per kind in the same shape the section serializers consume.

use std::fs;
use std::path::{Path, PathBuf};

use changeset_core::{EntityKind, EntityResolver, LiveEntity, ResolveError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid catalog yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Live entities grouped by kind.
///
/// ```yaml
/// content_types:
///   - name: homePage
///     properties:
///       - { name: Title, alias: title, value: Textstring }
/// stylesheets:
///   - name: site.css
///     alias: site
///     content: "body { margin: 0; }"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub content_types: Vec<LiveEntity>,
    #[serde(default)]
    pub data_types: Vec<LiveEntity>,
    #[serde(default)]
    pub templates: Vec<LiveEntity>,
    #[serde(default)]
    pub stylesheets: Vec<LiveEntity>,
    #[serde(default)]
    pub macros: Vec<LiveEntity>,
    #[serde(default)]
    pub partial_views: Vec<LiveEntity>,
}

impl Catalog {
    pub fn entities(&self, kind: EntityKind) -> &[LiveEntity] {
        match kind {
            EntityKind::ContentType => &self.content_types,
            EntityKind::DataType => &self.data_types,
            EntityKind::Template => &self.templates,
            EntityKind::Stylesheet => &self.stylesheets,
            EntityKind::Macro => &self.macros,
            EntityKind::PartialView => &self.partial_views,
        }
    }
}

/// Resolves entities from a [`Catalog`] loaded once at construction.
#[derive(Debug, Clone, Default)]
pub struct CatalogResolver {
    catalog: Catalog,
}

impl CatalogResolver {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Load a catalog from a YAML file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let resolver = Self::from_yaml(&contents)?;
        tracing::debug!("loaded catalog from {}", path.display());
        Ok(resolver)
    }

    /// Parse a catalog from YAML text. An empty document is an empty catalog.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::new(serde_yaml::from_str(yaml)?))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl EntityResolver for CatalogResolver {
    fn resolve_all(&self, kind: EntityKind) -> Result<Vec<LiveEntity>, ResolveError> {
        Ok(self.catalog.entities(kind).to_vec())
    }
}
