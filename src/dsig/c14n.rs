//! Exclusive XML canonicalization (without comments) of a document subtree.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeSet;

use super::document::{read_attributes, utf8, Document, Namespaces};
use crate::error::{SpidError, SpidResult};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

struct Scope {
    name: String,
    in_scope: Namespaces,
    rendered: Namespaces,
}

/// Canonical form of element `index`, leaving out the subtree of `exclude`
/// (the enveloped signature). `inclusive_prefixes` are rendered as in
/// inclusive canonicalization; `#default` names the default namespace.
pub(crate) fn canonicalize(
    doc: &Document<'_>,
    index: usize,
    exclude: Option<usize>,
    inclusive_prefixes: &[String],
) -> SpidResult<String> {
    let apex = doc.element(index);
    let skipped = exclude.map(|e| {
        let element = doc.element(e);
        (element.start, element.end)
    });
    let inclusive: BTreeSet<String> = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();

    let mut reader = Reader::from_str(&doc.xml()[apex.start..apex.end]);
    let mut out = String::with_capacity(apex.end - apex.start);
    let mut stack: Vec<Scope> = Vec::new();
    let root_scope = doc.inherited(index);

    loop {
        let position = apex.start + reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| SpidError::Parse(format!("canonicalization failed: {}", e)))?;
        if matches!(event, Event::Eof) {
            break;
        }
        if let Some((from, to)) = skipped {
            if position >= from && position < to {
                continue;
            }
        }

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let (inherited, rendered) = stack
                    .last()
                    .map(|s| (s.in_scope.clone(), s.rendered.clone()))
                    .unwrap_or_else(|| (root_scope.clone(), Namespaces::new()));
                let (in_scope, attributes) = read_attributes(e, inherited)?;
                let name = utf8(e.name().as_ref())?.to_string();

                let rendered = open_tag(&mut out, &name, &in_scope, rendered, &attributes, &inclusive);
                if matches!(event, Event::Empty(_)) {
                    out.push_str("</");
                    out.push_str(&name);
                    out.push('>');
                } else {
                    stack.push(Scope {
                        name,
                        in_scope,
                        rendered,
                    });
                }
            }
            Event::End(_) => {
                let scope = stack
                    .pop()
                    .ok_or_else(|| SpidError::Parse("unbalanced end tag".to_string()))?;
                out.push_str("</");
                out.push_str(&scope.name);
                out.push('>');
            }
            Event::Text(ref t) => {
                let raw = utf8(t)?.replace("\r\n", "\n").replace('\r', "\n");
                let text = quick_xml::escape::unescape(&raw)
                    .map_err(|e| SpidError::Parse(format!("bad text content: {}", e)))?;
                escape_text(&mut out, &text);
            }
            Event::CData(ref t) => {
                let raw = utf8(t)?.replace("\r\n", "\n").replace('\r', "\n");
                escape_text(&mut out, &raw);
            }
            Event::PI(ref pi) => {
                out.push_str("<?");
                out.push_str(utf8(pi)?);
                out.push_str("?>");
            }
            Event::DocType(_) => {
                return Err(SpidError::Parse("DTDs are not allowed".to_string()));
            }
            _ => {}
        }
    }

    Ok(out)
}

/// Write a canonical start tag and return the namespace bindings rendered
/// so far on this branch of the output.
fn open_tag(
    out: &mut String,
    name: &str,
    in_scope: &Namespaces,
    mut rendered: Namespaces,
    attributes: &[(String, String)],
    inclusive: &BTreeSet<String>,
) -> Namespaces {
    let mut utilized: BTreeSet<String> = inclusive.clone();
    utilized.insert(prefix_of(name).to_string());
    for (key, _) in attributes {
        let prefix = prefix_of(key);
        if !prefix.is_empty() && prefix != "xml" {
            utilized.insert(prefix.to_string());
        }
    }

    out.push('<');
    out.push_str(name);

    for prefix in &utilized {
        let uri = in_scope.get(prefix).map(String::as_str).unwrap_or("");
        let previous = rendered.get(prefix).map(String::as_str).unwrap_or("");
        if prefix.is_empty() {
            if previous == uri {
                continue;
            }
            out.push_str(" xmlns=\"");
        } else {
            if uri.is_empty() || rendered.get(prefix).map(String::as_str) == Some(uri) {
                continue;
            }
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attribute(out, uri);
        out.push('"');
        rendered.insert(prefix.clone(), uri.to_string());
    }

    let mut sorted: Vec<(&str, &str, &str, &str)> = attributes
        .iter()
        .map(|(key, value)| {
            let (namespace, local) = match key.split_once(':') {
                Some(("xml", local)) => (XML_NS, local),
                Some((prefix, local)) => (
                    in_scope.get(prefix).map(String::as_str).unwrap_or(""),
                    local,
                ),
                None => ("", key.as_str()),
            };
            (namespace, local, key.as_str(), value.as_str())
        })
        .collect();
    sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    for (_, _, key, value) in sorted {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attribute(out, value);
        out.push('"');
    }
    out.push('>');

    rendered
}

fn prefix_of(name: &str) -> &str {
    name.split_once(':').map(|(p, _)| p).unwrap_or("")
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
