// ABOUTME: Module root for package artifact export (XML tree, per-kind section serializers).
// ABOUTME: Re-exports the registry and renderer for convenient access.

pub mod sections;
pub mod xml;

pub use sections::{
    EntitySerializer, PACKAGE_ROOT, SerializeError, SerializerRegistry, section_element_name,
};
pub use xml::{XmlElement, XmlNode, render_document};
