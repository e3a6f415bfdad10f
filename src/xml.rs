//! Small quick-xml helpers shared by the metadata parser, the request cache
//! and the SAML client.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SpidError, SpidResult};

pub use quick_xml::escape::escape;

/// Whether the element has the given local name (namespace prefix ignored).
pub fn is_element(e: &BytesStart<'_>, local_name: &str) -> bool {
    e.local_name().as_ref() == local_name.as_bytes()
}

/// Read an attribute by local name.
pub fn attribute(e: &BytesStart<'_>, local_name: &str) -> SpidResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SpidError::Parse(format!("bad attribute: {}", e)))?;
        if attr.key.local_name().as_ref() == local_name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| SpidError::Parse(format!("bad attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Read an attribute of the document's root element.
pub fn root_attribute(xml: &str, local_name: &str) -> SpidResult<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => return attribute(&e, local_name),
            Event::Eof => return Err(SpidError::Parse("document has no root element".to_string())),
            _ => {}
        }
    }
}

/// Text content of the first element with the given local name.
pub fn first_element_text(xml: &str, local_name: &str) -> SpidResult<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if is_element(&e, local_name) => inside = true,
            Event::Text(t) if inside => {
                let text = t
                    .unescape()
                    .map_err(|e| SpidError::Parse(format!("bad text content: {}", e)))?;
                return Ok(Some(text.into_owned()));
            }
            Event::End(e) if inside && e.local_name().as_ref() == local_name.as_bytes() => {
                return Ok(Some(String::new()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Attribute of the first element with the given local name.
pub fn first_element_attribute(
    xml: &str,
    element: &str,
    local_name: &str,
) -> SpidResult<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if is_element(&e, element) => {
                return attribute(&e, local_name)
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Text content of every element with the given local name.
pub fn element_texts(xml: &str, local_name: &str) -> SpidResult<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    let mut texts = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if is_element(&e, local_name) => inside = true,
            Event::Text(t) if inside => {
                let text = t
                    .unescape()
                    .map_err(|e| SpidError::Parse(format!("bad text content: {}", e)))?;
                texts.push(text.into_owned());
            }
            Event::End(e) if e.local_name().as_ref() == local_name.as_bytes() => inside = false,
            Event::Eof => return Ok(texts),
            _ => {}
        }
    }
}
