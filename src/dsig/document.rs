//! Positional element index over a SAML document.
//!
//! Signing and verification need the exact byte span of each element and
//! the namespace bindings in scope at it; the streaming reader alone gives
//! neither.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

use crate::error::{SpidError, SpidResult};

/// Namespace bindings in scope: prefix (empty for default) to URI.
pub(crate) type Namespaces = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub(crate) struct Element {
    /// Qualified name as written.
    pub name: String,
    pub start: usize,
    pub start_tag_end: usize,
    pub content_end: usize,
    pub end: usize,
    pub parent: Option<usize>,
    /// Bindings in scope at this element, its own declarations included.
    pub namespaces: Namespaces,
    /// Attributes other than namespace declarations, values unescaped.
    pub attributes: Vec<(String, String)>,
}

impl Element {
    pub fn prefix(&self) -> &str {
        self.name.split_once(':').map(|(p, _)| p).unwrap_or("")
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, l)| l)
            .unwrap_or(&self.name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespaces
            .get(self.prefix())
            .map(String::as_str)
            .filter(|ns| !ns.is_empty())
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name() == local_name && self.namespace() == Some(namespace)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub(crate) struct Document<'a> {
    xml: &'a str,
    elements: Vec<Element>,
}

impl<'a> Document<'a> {
    /// Index every element of `xml`. DTDs, truncated documents and trailing
    /// roots are rejected.
    pub fn parse(xml: &'a str) -> SpidResult<Self> {
        let mut reader = Reader::from_str(xml);
        let mut elements: Vec<Element> = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|e| {
                SpidError::Parse(format!("malformed XML at position {}: {}", before, e))
            })?;
            let after = reader.buffer_position() as usize;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let parent = open.last().copied();
                    if parent.is_none() && !elements.is_empty() {
                        return Err(SpidError::Parse("multiple root elements".to_string()));
                    }
                    let inherited = parent
                        .map(|p| elements[p].namespaces.clone())
                        .unwrap_or_default();
                    let (namespaces, attributes) = read_attributes(e, inherited)?;
                    let start = tag_start(xml, before);
                    let empty = matches!(event, Event::Empty(_));

                    elements.push(Element {
                        name: utf8(e.name().as_ref())?.to_string(),
                        start,
                        start_tag_end: after,
                        content_end: after,
                        end: after,
                        parent,
                        namespaces,
                        attributes,
                    });
                    if !empty {
                        open.push(elements.len() - 1);
                    }
                }
                Event::End(_) => {
                    let index = open
                        .pop()
                        .ok_or_else(|| SpidError::Parse("unbalanced end tag".to_string()))?;
                    elements[index].content_end = tag_start(xml, before);
                    elements[index].end = after;
                }
                Event::DocType(_) => {
                    return Err(SpidError::Parse("DTDs are not allowed".to_string()));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !open.is_empty() || elements.is_empty() {
            return Err(SpidError::Parse("truncated XML document".to_string()));
        }

        Ok(Self { xml, elements })
    }

    pub fn xml(&self) -> &'a str {
        self.xml
    }

    pub fn element(&self, index: usize) -> &Element {
        &self.elements[index]
    }

    pub fn elements(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.elements.iter().enumerate()
    }

    /// Bindings inherited from the ancestors of `index`.
    pub fn inherited(&self, index: usize) -> Namespaces {
        self.elements[index]
            .parent
            .map(|p| self.elements[p].namespaces.clone())
            .unwrap_or_default()
    }

    pub fn children<'d>(
        &'d self,
        parent: usize,
        namespace: &'d str,
        local_name: &'d str,
    ) -> impl Iterator<Item = usize> + 'd {
        self.elements()
            .filter(move |(_, e)| e.parent == Some(parent) && e.is(namespace, local_name))
            .map(|(i, _)| i)
    }

    pub fn child(&self, parent: usize, namespace: &str, local_name: &str) -> Option<usize> {
        self.children(parent, namespace, local_name).next()
    }

    /// The single element carrying `ID="id"`. Duplicates are an error.
    pub fn by_id(&self, id: &str) -> SpidResult<usize> {
        let mut matches = self
            .elements()
            .filter(|(_, e)| e.attribute("ID") == Some(id))
            .map(|(i, _)| i);
        match (matches.next(), matches.next()) {
            (Some(index), None) => Ok(index),
            (None, _) => Err(SpidError::Signature(format!("no element with ID {}", id))),
            _ => Err(SpidError::Signature(format!("duplicate ID {}", id))),
        }
    }

    /// Text content of a leaf element with all whitespace removed.
    pub fn compact_text(&self, index: usize) -> String {
        let e = &self.elements[index];
        self.xml[e.start_tag_end..e.content_end]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }
}

// the reader may report the offset just before leading whitespace
fn tag_start(xml: &str, from: usize) -> usize {
    xml[from..].find('<').map(|o| from + o).unwrap_or(from)
}

pub(crate) fn utf8(bytes: &[u8]) -> SpidResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| SpidError::Parse(format!("invalid UTF-8: {}", e)))
}

/// Split a start tag's attributes into updated namespace bindings and
/// ordinary attributes.
pub(crate) fn read_attributes(
    e: &BytesStart<'_>,
    mut namespaces: Namespaces,
) -> SpidResult<(Namespaces, Vec<(String, String)>)> {
    let mut attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|err| SpidError::Parse(format!("bad attribute: {}", err)))?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = attribute_value(&attr.value)?;

        if key == "xmlns" {
            namespaces.insert(String::new(), value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.insert(prefix.to_string(), value);
        } else {
            attributes.push((key, value));
        }
    }

    Ok((namespaces, attributes))
}

/// Attribute value after XML whitespace normalization and unescaping.
fn attribute_value(raw: &[u8]) -> SpidResult<String> {
    let normalized = utf8(raw)?
        .replace("\r\n", "\n")
        .replace(['\t', '\n', '\r'], " ");
    quick_xml::escape::unescape(&normalized)
        .map(|v| v.into_owned())
        .map_err(|e| SpidError::Parse(format!("bad attribute value: {}", e)))
}
