//! Small XML toolkit shared by the client and the mock server.
//!
//! Writing goes through [`XmlWriter`], which escapes every text value and
//! attribute. Reading works on `xmltree::Element`s: lookups accept a
//! prefixed name such as `"tt:Name"`, prefer an element with that exact
//! prefix and otherwise fall back to a local-name match, so peers that pick
//! different prefixes (or a default namespace) still parse.

use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;

use xmltree::{Element, XMLNode};

use crate::error::{Result, SoapError};

/// Escape text for use in element content or attribute values.
pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Append-only XML builder.
#[derive(Debug, Default, Clone)]
pub struct XmlWriter {
    buf: String,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<name>`
    pub fn open(&mut self, name: &str) -> &mut Self {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
        self
    }

    /// `<name a="b" ...>`
    pub fn open_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> &mut Self {
        self.buf.push('<');
        self.buf.push_str(name);
        self.push_attrs(attrs);
        self.buf.push('>');
        self
    }

    /// `</name>`
    pub fn close(&mut self, name: &str) -> &mut Self {
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
        self
    }

    /// `<name>text</name>` with the text escaped
    pub fn leaf(&mut self, name: &str, text: impl Display) -> &mut Self {
        let text = text.to_string();
        self.open(name);
        self.buf.push_str(&escape(&text));
        self.close(name)
    }

    /// Writes the leaf only when a value is present
    pub fn leaf_opt<T: Display>(&mut self, name: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.leaf(name, value);
        }
        self
    }

    /// `<name a="b" ... />`
    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> &mut Self {
        self.buf.push('<');
        self.buf.push_str(name);
        self.push_attrs(attrs);
        self.buf.push_str("/>");
        self
    }

    /// Append pre-built XML verbatim
    pub fn raw(&mut self, xml: &str) -> &mut Self {
        self.buf.push_str(xml);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> String {
        self.buf
    }

    fn push_attrs(&mut self, attrs: &[(&str, &str)]) {
        for (key, value) in attrs {
            self.buf.push(' ');
            self.buf.push_str(key);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape(value));
            self.buf.push('"');
        }
    }
}

/// Parse a complete XML document.
pub fn parse_document(xml: &str) -> Result<Element> {
    Element::parse(xml.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))
}

/// Strip an optional `prefix:` from a qualified name.
pub fn local_name(qualified: &str) -> &str {
    match qualified.rsplit_once(':') {
        Some((_, local)) => local,
        None => qualified,
    }
}

fn split_name(qualified: &str) -> (Option<&str>, &str) {
    match qualified.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qualified),
    }
}

fn element_children(el: &Element) -> impl Iterator<Item = &Element> {
    el.children.iter().filter_map(XMLNode::as_element)
}

/// Find a child element, preferring an exact prefix match and falling back
/// to the first child with the same local name.
pub fn child<'a>(el: &'a Element, name: &str) -> Option<&'a Element> {
    let (prefix, local) = split_name(name);
    if let Some(prefix) = prefix {
        let exact = element_children(el)
            .find(|c| c.name == local && c.prefix.as_deref() == Some(prefix));
        if exact.is_some() {
            return exact;
        }
    }
    element_children(el).find(|c| c.name == local)
}

/// All children whose local name matches.
pub fn children<'a>(el: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    let local = local_name(name);
    element_children(el).filter(move |c| c.name == local)
}

/// First element child regardless of name.
pub fn first_element_child(el: &Element) -> Option<&Element> {
    element_children(el).next()
}

pub fn require_child<'a>(el: &'a Element, name: &str) -> Result<&'a Element> {
    child(el, name).ok_or_else(|| SoapError::MissingElement(format!("{}/{}", el.name, local_name(name))))
}

/// Trimmed text content of an element (empty when there is none).
pub fn text(el: &Element) -> String {
    el.get_text()
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

pub fn child_text(el: &Element, name: &str) -> Option<String> {
    child(el, name).map(text)
}

pub fn require_text(el: &Element, name: &str) -> Result<String> {
    require_child(el, name).map(text)
}

fn parse_value<T: FromStr>(context: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| SoapError::Parse(format!("invalid value '{}' for {}", raw, context)))
}

/// Parse an optional child's text into `T`.
pub fn parse_child<T: FromStr>(el: &Element, name: &str) -> Result<Option<T>> {
    match child(el, name) {
        Some(c) => parse_value(name, &text(c)).map(Some),
        None => Ok(None),
    }
}

pub fn require_parsed<T: FromStr>(el: &Element, name: &str) -> Result<T> {
    let raw = require_text(el, name)?;
    parse_value(name, &raw)
}

/// Attribute lookup by local name.
pub fn attr<'a>(el: &'a Element, name: &str) -> Option<&'a str> {
    let local = local_name(name);
    el.attributes.get(local).map(String::as_str)
}

pub fn parse_attr<T: FromStr>(el: &Element, name: &str) -> Result<Option<T>> {
    match attr(el, name) {
        Some(raw) => parse_value(name, raw).map(Some),
        None => Ok(None),
    }
}

/// `xs:boolean` accepts `true`, `false`, `1` and `0`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Boolean child, absent or unparseable values read as `false`.
pub fn child_flag(el: &Element, name: &str) -> bool {
    child_text(el, name)
        .and_then(|t| parse_bool(&t))
        .unwrap_or(false)
}

pub fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
