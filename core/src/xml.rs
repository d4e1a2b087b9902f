//! Minimal owned XML tree used for request documents and XML replies.
//!
//! # Design
//! The service speaks small, shallow XML documents, so a plain owned tree is
//! enough: requests are built as `XmlElement` values and written with
//! `quick-xml`, and replies are read back into the same type so the outcome
//! readers can walk them without holding a streaming parser.

use std::borrow::Cow;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::CrmError;

/// An element with its attributes, text content and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Depth-first search over this element and all descendants.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// Every descendant (or self) named `name`, in document order.
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        if self.name == name {
            out.push(self);
        }
        for child in &self.children {
            child.find_all(name, out);
        }
    }

    /// Serialize without an XML declaration. Elements with neither text nor
    /// children are written self-closing.
    pub fn to_xml(&self) -> Result<String, CrmError> {
        let mut writer = Writer::new(Vec::new());
        self.write(&mut writer)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| CrmError::SerializationError(e.to_string()))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), CrmError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let text = self.text.as_deref().filter(|text| !text.is_empty());
        if text.is_none() && self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(write_error);
        }

        writer.write_event(Event::Start(start)).map_err(write_error)?;
        if let Some(text) = text {
            writer.write_event(Event::Text(BytesText::new(text))).map_err(write_error)?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(write_error)
    }

    /// Parse a complete document and return its root element.
    pub fn parse(body: &[u8]) -> Result<XmlElement, CrmError> {
        let mut reader = Reader::from_reader(body);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event().map_err(read_error)? {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        CrmError::DeserializationError("unbalanced closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(read_error)?;
                    append_text(&mut stack, text);
                }
                Event::CData(data) => {
                    let bytes = data.into_inner();
                    let text = std::str::from_utf8(&bytes).map_err(read_error)?.to_string();
                    append_text(&mut stack, Cow::Owned(text));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(CrmError::DeserializationError("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| CrmError::DeserializationError("empty XML document".to_string()))
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, CrmError> {
    let name = std::str::from_utf8(start.name().as_ref()).map_err(read_error)?.to_string();
    let mut element = XmlElement::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(read_error)?;
        let key = std::str::from_utf8(attribute.key.as_ref()).map_err(read_error)?.to_string();
        let value = attribute.unescape_value().map_err(read_error)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn append_text(stack: &mut [XmlElement], text: Cow<'_, str>) {
    if let Some(current) = stack.last_mut() {
        current.text.get_or_insert_with(String::new).push_str(&text);
    }
}

fn write_error(e: impl std::fmt::Display) -> CrmError {
    CrmError::SerializationError(e.to_string())
}

fn read_error(e: impl std::fmt::Display) -> CrmError {
    CrmError::DeserializationError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_elements_with_attributes() {
        let mut element = XmlElement::new("Leads").with_attribute("a", "1");
        element.children.push(
            XmlElement::new("FL")
                .with_attribute("val", "Last Name")
                .with_text("Smith"),
        );
        assert_eq!(
            element.to_xml().unwrap(),
            r#"<Leads a="1"><FL val="Last Name">Smith</FL></Leads>"#
        );
    }

    #[test]
    fn empty_element_is_self_closing() {
        let element = XmlElement::new("FL").with_attribute("val", "Phone").with_text("");
        assert_eq!(element.to_xml().unwrap(), r#"<FL val="Phone"/>"#);
    }

    #[test]
    fn text_is_escaped() {
        let element = XmlElement::new("FL").with_text("Smith & <Sons>");
        let xml = element.to_xml().unwrap();
        assert!(xml.contains("Smith &amp; &lt;Sons&gt;"), "{xml}");
        let back = XmlElement::parse(xml.as_bytes()).unwrap();
        assert_eq!(back.text(), "Smith & <Sons>");
    }

    #[test]
    fn parses_tree_with_empty_and_cdata() {
        let body = br#"<?xml version="1.0" encoding="UTF-8" ?>
            <response uri="/x">
                <result>
                    <message><![CDATA[done]]></message>
                    <flag/>
                </result>
            </response>"#;
        let root = XmlElement::parse(body).unwrap();
        assert_eq!(root.name, "response");
        assert_eq!(root.attribute("uri"), Some("/x"));
        let result = root.child("result").unwrap();
        assert_eq!(result.child("message").unwrap().text(), "done");
        assert!(result.child("flag").is_some());
        assert_eq!(root.find("message").map(XmlElement::text), Some("done"));
    }

    #[test]
    fn rejects_truncated_document() {
        let err = XmlElement::parse(b"<response><result>").unwrap_err();
        assert!(matches!(err, CrmError::DeserializationError(_)));
    }

    #[test]
    fn rejects_empty_document() {
        let err = XmlElement::parse(b"").unwrap_err();
        assert!(matches!(err, CrmError::DeserializationError(_)));
    }
}
