//! Flat view over the attribute-style markup exchanged with the cloud.
//!
//! Discovery replies carry values in `value` attributes of the root's
//! children (`<param><code value="1020" />...</param>`); device replies
//! carry them as element text (`<Device.System.Power.State>ON</...>`).

use crate::error::Error;
use xml::reader::{EventReader, XmlEvent};

/// Root tag of device command replies.
pub const SMARTPLUG_TAG: &str = "<SMARTPLUG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// 0 for the root element
    pub depth: usize,
    pub attributes: Vec<(String, String)>,
    /// Concatenated text of the element and all its descendants
    pub text: String,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Elements of one document in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markup {
    elements: Vec<Element>,
}

impl Markup {
    /// Parse a document. Anything after the root element is ignored.
    pub fn parse(text: &str) -> Result<Self, Error> {
        // Devices declare encoding="UTF8", which is not a registered label
        let text = strip_declaration(text);
        let mut elements: Vec<Element> = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        for event in EventReader::new(text.as_bytes()) {
            match event? {
                XmlEvent::StartElement { name, attributes, .. } => {
                    elements.push(Element {
                        name: name.local_name,
                        depth: open.len(),
                        attributes: attributes
                            .into_iter()
                            .map(|attr| (attr.name.local_name, attr.value))
                            .collect(),
                        text: String::new(),
                    });
                    open.push(elements.len() - 1);
                }
                XmlEvent::Characters(chunk) | XmlEvent::CData(chunk) => {
                    for &idx in &open {
                        elements[idx].text.push_str(&chunk);
                    }
                }
                XmlEvent::EndElement { .. } => {
                    open.pop();
                    if open.is_empty() {
                        break;
                    }
                }
                XmlEvent::EndDocument => break,
                _ => {}
            }
        }

        if elements.is_empty() {
            return Err(Error::Markup("document has no root element".to_string()));
        }
        Ok(Self { elements })
    }

    /// Parse the markup embedded in an HTTP-like device reply.
    ///
    /// Returns `Ok(None)` when the reply carries no `<SMARTPLUG` document.
    pub fn from_http_like(text: &str) -> Result<Option<Self>, Error> {
        match text.find(SMARTPLUG_TAG) {
            Some(idx) => Self::parse(&text[idx..]).map(Some),
            None => Ok(None),
        }
    }

    pub fn root(&self) -> Option<&Element> {
        self.elements.first()
    }

    /// `value` attribute of the first direct child of the root named `name`.
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|e| e.depth == 1 && e.name == name)
            .and_then(|e| e.attribute("value"))
    }

    /// Text of the first element named `name`, at any depth.
    pub fn descendant_text(&self, name: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.text.as_str())
    }
}

fn strip_declaration(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    trimmed
}
