// ABOUTME: Minimal XML element tree and deterministic pretty-printer for package artifacts.
// ABOUTME: Escapes text and attribute values and splits CDATA terminators so output stays well-formed.

use std::fmt::Write;

/// A child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Shorthand for `<name>text</name>`.
    pub fn text_element(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = XmlElement>) -> Self {
        let nodes = children.into_iter().map(XmlNode::Element);
        self.children.extend(nodes);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn with_cdata(mut self, data: impl Into<String>) -> Self {
        self.children.push(XmlNode::CData(data.into()));
        self
    }

    /// The first character anywhere in this tree (names, attribute values,
    /// text and CDATA) that an XML 1.0 document cannot carry.
    pub fn find_invalid_char(&self) -> Option<char> {
        if let Some(c) = first_invalid(&self.name) {
            return Some(c);
        }
        for (name, value) in &self.attributes {
            if let Some(c) = first_invalid(name).or_else(|| first_invalid(value)) {
                return Some(c);
            }
        }
        self.children.iter().find_map(|child| match child {
            XmlNode::Element(e) => e.find_invalid_char(),
            XmlNode::Text(s) | XmlNode::CData(s) => first_invalid(s),
        })
    }

    fn has_element_children(&self) -> bool {
        self.children
            .iter()
            .any(|c| matches!(c, XmlNode::Element(_)))
    }
}

/// Whether XML 1.0 allows `c` anywhere in a document.
pub fn is_xml_char(c: char) -> bool {
    match c {
        '\u{9}' | '\u{A}' | '\u{D}' => true,
        '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' => true,
        c => c >= '\u{10000}',
    }
}

fn first_invalid(s: &str) -> Option<char> {
    s.chars().find(|c| !is_xml_char(*c))
}

/// Render a full document with an XML declaration and two-space indentation.
pub fn render_document(root: &XmlElement) -> String {
    let mut out = String::new();
    writeln!(out, r#"<?xml version="1.0" encoding="utf-8"?>"#).unwrap();
    write_element(&mut out, root, 0);
    out
}

fn write_element(out: &mut String, element: &XmlElement, depth: usize) {
    let indent = "  ".repeat(depth);
    write!(out, "{}<{}", indent, element.name).unwrap();
    for (name, value) in &element.attributes {
        let value = escape_attr(value);
        write!(out, " {}=\"{}\"", name, value).unwrap();
    }

    if element.children.is_empty() {
        writeln!(out, " />").unwrap();
        return;
    }

    // Text-only elements stay on one line so content is not padded with whitespace.
    if !element.has_element_children() {
        out.push('>');
        for child in &element.children {
            write_inline(out, child);
        }
        writeln!(out, "</{}>", element.name).unwrap();
        return;
    }

    writeln!(out, ">").unwrap();
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(out, e, depth + 1),
            other => {
                out.push_str(&"  ".repeat(depth + 1));
                write_inline(out, other);
                out.push('\n');
            }
        }
    }
    writeln!(out, "{}</{}>", indent, element.name).unwrap();
}

fn write_inline(out: &mut String, node: &XmlNode) {
    match node {
        XmlNode::Text(text) => out.push_str(&escape_text(text)),
        XmlNode::CData(data) => {
            let split = data.replace("]]>", "]]]]><![CDATA[>");
            write!(out, "<![CDATA[{}]]>", split).unwrap();
        }
        XmlNode::Element(e) => write_element(out, e, 0),
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s)
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
}
