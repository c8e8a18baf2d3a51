// ABOUTME: Per-kind serializers that turn live entities into package XML sections.
// ABOUTME: Provides host-format defaults, a registry for overrides, and the package document renderer.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::entity::LiveEntity;
use crate::export::xml::{XmlElement, render_document};
use crate::kind::EntityKind;
use crate::package::Package;

/// Root element of a package artifact.
pub const PACKAGE_ROOT: &str = "umbPackage";

/// Errors that can occur while serializing a package.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("no serializer registered for {0}")]
    MissingSerializer(EntityKind),

    #[error("cannot serialize {kind} '{name}': {message}")]
    Invalid {
        kind: EntityKind,
        name: String,
        message: String,
    },
}

/// Converts one live entity of a given kind into its artifact element.
pub trait EntitySerializer: Send + Sync {
    fn serialize(&self, entity: &LiveEntity) -> Result<XmlElement, SerializeError>;
}

impl<F> EntitySerializer for F
where
    F: Fn(&LiveEntity) -> Result<XmlElement, SerializeError> + Send + Sync,
{
    fn serialize(&self, entity: &LiveEntity) -> Result<XmlElement, SerializeError> {
        self(entity)
    }
}

/// The container element name for a kind's section.
pub fn section_element_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::ContentType => "DocumentTypes",
        EntityKind::DataType => "DataTypes",
        EntityKind::Template => "Templates",
        EntityKind::Macro => "Macros",
        EntityKind::Stylesheet => "Stylesheets",
        EntityKind::PartialView => "PartialViews",
    }
}

/// Serializers keyed by kind. Hosts override individual kinds with
/// [`SerializerRegistry::register`].
pub struct SerializerRegistry {
    serializers: BTreeMap<EntityKind, Box<dyn EntitySerializer>>,
}

impl SerializerRegistry {
    /// A registry with no serializers. Every populated section fails with
    /// [`SerializeError::MissingSerializer`] until one is registered.
    pub fn empty() -> Self {
        Self {
            serializers: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in serializer for every kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(EntityKind::ContentType, document_type);
        registry.register(EntityKind::DataType, data_type);
        registry.register(EntityKind::Template, template);
        registry.register(EntityKind::Macro, macro_definition);
        registry.register(EntityKind::Stylesheet, stylesheet);
        registry.register(EntityKind::PartialView, partial_view);
        registry
    }

    pub fn register(&mut self, kind: EntityKind, serializer: impl EntitySerializer + 'static) {
        self.serializers.insert(kind, Box::new(serializer));
    }

    /// Build the full package element tree. Sections keep the package's order.
    /// An entity whose element holds a character XML 1.0 forbids is rejected
    /// here, before anything reaches disk.
    pub fn package_element(&self, package: &Package) -> Result<XmlElement, SerializeError> {
        let mut root = XmlElement::new(PACKAGE_ROOT);

        for section in &package.sections {
            let serializer = self
                .serializers
                .get(&section.kind)
                .ok_or(SerializeError::MissingSerializer(section.kind))?;

            let mut container = XmlElement::new(section_element_name(section.kind));
            for entity in &section.entities {
                let element = serializer.serialize(entity)?;
                if let Some(c) = element.find_invalid_char() {
                    let message = format!("U+{:04X} is not allowed in XML 1.0", c as u32);
                    return Err(SerializeError::Invalid {
                        kind: section.kind,
                        name: entity.name.clone(),
                        message,
                    });
                }
                container = container.with_child(element);
            }
            root = root.with_child(container);
        }

        Ok(root)
    }

    /// Render the package as an XML document string.
    pub fn render_package(&self, package: &Package) -> Result<String, SerializeError> {
        let root = self.package_element(package)?;
        Ok(render_document(&root))
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn properties<'a>(
    entity: &'a LiveEntity,
    element: &'a str,
) -> impl Iterator<Item = XmlElement> + 'a {
    entity.properties.iter().map(move |p| {
        XmlElement::new(element)
            .with_child(XmlElement::text_element("Name", p.name.clone()))
            .with_child(XmlElement::text_element("Alias", p.alias_or_name()))
            .with_child(XmlElement::text_element("Value", p.value.clone()))
    })
}

fn cdata_element(name: &str, content: Option<&str>) -> XmlElement {
    let data = content.unwrap_or_default();
    XmlElement::new(name).with_cdata(data)
}

fn file_name_or_name(entity: &LiveEntity) -> &str {
    entity.file_name.as_deref().unwrap_or(&entity.name)
}

fn document_type(entity: &LiveEntity) -> Result<XmlElement, SerializeError> {
    let info = XmlElement::new("Info")
        .with_child(XmlElement::text_element("Name", entity.name.clone()))
        .with_child(XmlElement::text_element("Alias", entity.alias_or_name()));
    let generic = XmlElement::new("GenericProperties")
        .with_children(properties(entity, "GenericProperty"));

    Ok(XmlElement::new("DocumentType")
        .with_child(info)
        .with_child(generic))
}

fn data_type(entity: &LiveEntity) -> Result<XmlElement, SerializeError> {
    let prevalues = entity.properties.iter().map(|p| {
        XmlElement::new("PreValue")
            .with_attr("Alias", p.alias_or_name())
            .with_attr("Value", p.value.clone())
    });

    Ok(XmlElement::new("DataType")
        .with_attr("Name", entity.name.clone())
        .with_attr("Id", entity.alias_or_name())
        .with_child(XmlElement::new("PreValues").with_children(prevalues)))
}

fn template(entity: &LiveEntity) -> Result<XmlElement, SerializeError> {
    Ok(XmlElement::new("Template")
        .with_child(XmlElement::text_element("Name", entity.name.clone()))
        .with_child(XmlElement::text_element("Alias", entity.alias_or_name()))
        .with_child(cdata_element("Design", entity.content.as_deref())))
}

fn macro_definition(entity: &LiveEntity) -> Result<XmlElement, SerializeError> {
    let params = entity.properties.iter().map(|p| {
        XmlElement::new("property")
            .with_attr("name", p.name.clone())
            .with_attr("alias", p.alias_or_name())
            .with_attr("propertyType", p.value.clone())
    });
    let scripting_file = entity.file_name.clone().unwrap_or_default();

    Ok(XmlElement::new("macro")
        .with_child(XmlElement::text_element("name", entity.name.clone()))
        .with_child(XmlElement::text_element("alias", entity.alias_or_name()))
        .with_child(XmlElement::text_element("scriptingFile", scripting_file))
        .with_child(XmlElement::new("properties").with_children(params)))
}

fn stylesheet(entity: &LiveEntity) -> Result<XmlElement, SerializeError> {
    let rules = properties(entity, "Property");

    Ok(XmlElement::new("Stylesheet")
        .with_child(XmlElement::text_element("Name", entity.alias_or_name()))
        .with_child(XmlElement::text_element("FileName", file_name_or_name(entity)))
        .with_child(cdata_element("Content", entity.content.as_deref()))
        .with_child(XmlElement::new("Properties").with_children(rules)))
}

fn partial_view(entity: &LiveEntity) -> Result<XmlElement, SerializeError> {
    Ok(XmlElement::new("View")
        .with_child(XmlElement::text_element("Name", entity.name.clone()))
        .with_child(XmlElement::text_element("FileName", file_name_or_name(entity)))
        .with_child(cdata_element("Content", entity.content.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::SECTION_ORDER;
    use std::collections::BTreeMap;

    fn package_with(kinds: &[(EntityKind, LiveEntity)]) -> Package {
        let mut resolved: BTreeMap<EntityKind, Vec<LiveEntity>> = BTreeMap::new();
        for (kind, entity) in kinds {
            resolved.entry(*kind).or_default().push(entity.clone());
        }
        let mut order = SECTION_ORDER.to_vec();
        order.push(EntityKind::PartialView);
        Package::assemble("test".to_string(), resolved, &order)
    }

    #[test]
    fn renders_sections_in_fixed_order_under_root() {
        let package = package_with(&[
            (EntityKind::Stylesheet, LiveEntity::named("site.css")),
            (EntityKind::ContentType, LiveEntity::named("home")),
            (EntityKind::Macro, LiveEntity::named("nav")),
        ]);

        let xml = SerializerRegistry::with_defaults()
            .render_package(&package)
            .unwrap();

        let doc_types = xml.find("<DocumentTypes>").unwrap();
        let macros = xml.find("<Macros>").unwrap();
        let sheets = xml.find("<Stylesheets>").unwrap();
        assert!(xml.contains("<umbPackage>"));
        assert!(doc_types < macros && macros < sheets);
        assert!(!xml.contains("<DataTypes>"));
        assert!(!xml.contains("<Templates>"));
    }

    #[test]
    fn stylesheet_uses_alias_as_name_and_cdata_content() {
        let sheet = LiveEntity::named("site.css")
            .with_alias("site")
            .with_content("h1 { color: red; }")
            .with_property("Heading", Some("h1"), "color: red;");

        let element = stylesheet(&sheet).unwrap();
        let xml = render_document(&element);

        assert!(xml.contains("<Name>site</Name>"));
        assert!(xml.contains("<FileName>site.css</FileName>"));
        assert!(xml.contains("<Content><![CDATA[h1 { color: red; }]]></Content>"));
        assert!(xml.contains("<Alias>h1</Alias>"));
        assert!(xml.contains("<Value>color: red;</Value>"));
    }

    #[test]
    fn template_design_is_wrapped_in_cdata() {
        let master = LiveEntity::named("Master").with_content("<html>@RenderBody()</html>");
        let element = template(&master).unwrap();
        let xml = render_document(&element);
        assert!(xml.contains("<Design><![CDATA[<html>@RenderBody()</html>]]></Design>"));
    }

    #[test]
    fn missing_serializer_is_reported() {
        let package = package_with(&[(EntityKind::Template, LiveEntity::named("Master"))]);
        let err = SerializerRegistry::empty()
            .render_package(&package)
            .unwrap_err();
        assert!(matches!(err, SerializeError::MissingSerializer(EntityKind::Template)));
    }

    #[test]
    fn registered_override_replaces_default() {
        let mut registry = SerializerRegistry::with_defaults();
        let custom = |entity: &LiveEntity| -> Result<XmlElement, SerializeError> {
            Ok(XmlElement::new("CustomMacro").with_attr("name", entity.name.clone()))
        };
        registry.register(EntityKind::Macro, custom);

        let package = package_with(&[(EntityKind::Macro, LiveEntity::named("nav"))]);
        let xml = registry.render_package(&package).unwrap();
        assert!(xml.contains(r#"<CustomMacro name="nav" />"#));
    }

    #[test]
    fn serializer_errors_propagate() {
        let mut registry = SerializerRegistry::with_defaults();
        let failing = |entity: &LiveEntity| -> Result<XmlElement, SerializeError> {
            Err(SerializeError::Invalid {
                kind: EntityKind::DataType,
                name: entity.name.clone(),
                message: "no editor".to_string(),
            })
        };
        registry.register(EntityKind::DataType, failing);

        let package = package_with(&[(EntityKind::DataType, LiveEntity::named("Tags"))]);
        let err = registry.render_package(&package).unwrap_err();
        assert!(err.to_string().contains("Tags"));
    }

    #[test]
    fn characters_xml_cannot_carry_are_rejected() {
        let sheet = LiveEntity::named("site.css")
            .with_content("a\u{1}b")
            .with_property("Heading", None, "x\u{0}y");
        let package = package_with(&[(EntityKind::Stylesheet, sheet)]);

        let err = SerializerRegistry::with_defaults()
            .render_package(&package)
            .unwrap_err();
        match err {
            SerializeError::Invalid {
                kind,
                name,
                message,
            } => {
                assert_eq!(kind, EntityKind::Stylesheet);
                assert_eq!(name, "site.css");
                assert!(message.contains("U+0001"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }

        let property_only = LiveEntity::named("Tags").with_property("Max", None, "x\u{0}y");
        let package = package_with(&[(EntityKind::DataType, property_only)]);
        let err = SerializerRegistry::with_defaults()
            .render_package(&package)
            .unwrap_err();
        assert!(err.to_string().contains("U+0000"));
    }
}
