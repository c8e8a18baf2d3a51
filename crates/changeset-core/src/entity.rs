// ABOUTME: Defines LiveEntity, the host's current view of an entity handed back by a resolver.
// ABOUTME: Fields are opaque to the ledger and interpreted only by section serializers.

use serde::{Deserialize, Serialize};

/// A named property attached to a live entity (stylesheet rules, macro
/// parameters, data type prevalues and so on).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProperty {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub value: String,
}

impl EntityProperty {
    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// The live state of a host entity at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEntity {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub properties: Vec<EntityProperty>,
}

impl LiveEntity {
    /// Create an entity with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            file_name: None,
            content: None,
            properties: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        alias: Option<&str>,
        value: impl Into<String>,
    ) -> Self {
        self.properties.push(EntityProperty {
            name: name.into(),
            alias: alias.map(str::to_string),
            value: value.into(),
        });
        self
    }

    /// The alias if the host set one, otherwise the name.
    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_populate_fields() {
        let entity = LiveEntity::named("site")
            .with_alias("siteCss")
            .with_file_name("site.css")
            .with_content("body { margin: 0; }")
            .with_property("Heading", Some("h1"), "font-size: 2em;");

        assert_eq!(entity.name, "site");
        assert_eq!(entity.alias_or_name(), "siteCss");
        assert_eq!(entity.file_name.as_deref(), Some("site.css"));
        assert_eq!(entity.properties.len(), 1);
        assert_eq!(entity.properties[0].alias_or_name(), "h1");
    }

    #[test]
    fn alias_falls_back_to_name() {
        let entity = LiveEntity::named("homePage");
        assert_eq!(entity.alias_or_name(), "homePage");

        let entity = entity.with_property("Title", None, "Textstring");
        assert_eq!(entity.properties[0].alias_or_name(), "Title");
    }
}
