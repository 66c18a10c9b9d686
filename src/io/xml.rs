//! Minimal XML element tree.
//!
//! Serializers build an [`XmlElement`] tree and write it in one pass;
//! deserializers parse the whole document into a tree first and then convert
//! it to typed values, so no streaming handler state is needed.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push((key.into(), value.to_string()));
        self
    }

    pub fn with_text(mut self, text: impl ToString) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn require_attr(&self, key: &str) -> Result<&str> {
        self.attr(key).ok_or_else(|| {
            CoreError::Xml(format!("Element <{}> is missing attribute [{}]", self.name, key))
        })
    }

    pub fn attr_f64(&self, key: &str) -> Result<f64> {
        parse_value(self.require_attr(key)?, key)
    }

    pub fn attr_i64(&self, key: &str) -> Result<i64> {
        parse_value(self.require_attr(key)?, key)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn require_child(&self, name: &str) -> Result<&XmlElement> {
        self.child(name).ok_or_else(|| {
            CoreError::Xml(format!("Element <{}> is missing child <{}>", self.name, name))
        })
    }

    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn text_f64(&self) -> Result<f64> {
        parse_value(self.text.trim(), &self.name)
    }

    pub fn text_i64(&self) -> Result<i64> {
        parse_value(self.text.trim(), &self.name)
    }

    pub fn text_bool(&self) -> Result<bool> {
        parse_bool(self.text.trim()).ok_or_else(|| {
            CoreError::Xml(format!("Invalid boolean [{}] in <{}>", self.text, self.name))
        })
    }

    /// Text of the named child parsed as `f64`.
    pub fn child_f64(&self, name: &str) -> Result<f64> {
        self.require_child(name)?.text_f64()
    }

    pub fn child_i64(&self, name: &str) -> Result<i64> {
        self.require_child(name)?.text_i64()
    }

    pub fn child_text(&self, name: &str) -> Result<&str> {
        Ok(self.require_child(name)?.text.trim())
    }

    /// Serialize with an XML declaration and two-space indentation.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write_element(&mut writer, self)?;
        String::from_utf8(writer.into_inner()).map_err(|e| CoreError::Xml(e.to_string()))
    }

    /// Parse a document and return its root element.
    pub fn parse(text: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| CoreError::Xml("Unbalanced closing tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(CoreError::Xml(format!("Unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| CoreError::Xml("Document has no root element".to_string()))
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(CoreError::Xml("Document has more than one root element".to_string()));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| CoreError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if !element.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&element.text)))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

fn parse_value<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| CoreError::Xml(format!("Invalid value [{}] for [{}]", text, what)))
}

/// Accepts `true/false`, `yes/no` and `1/0`, case-insensitively.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Shorthand for a leaf element holding a single value.
pub fn leaf(name: &str, value: impl ToString) -> XmlElement {
    XmlElement::new(name).with_text(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_parse_tree() {
        let min_lat =
            XmlElement::new("minLat").with_attr("value", 1.5).with_attr("pointId", "P<1>");
        let doc = XmlElement::new("bundleResults")
            .with_child(leaf("id", "abc"))
            .with_child(XmlElement::new("minMaxSigmas").with_child(min_lat));
        let text = doc.to_xml_string().unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(text.contains("P&lt;1&gt;"));

        let parsed = XmlElement::parse(&text).unwrap();
        assert_eq!(parsed, doc);
        let sigmas = parsed.require_child("minMaxSigmas").unwrap();
        let min_lat = sigmas.require_child("minLat").unwrap();
        assert_eq!(min_lat.attr_f64("value").unwrap(), 1.5);
        assert_eq!(min_lat.attr("pointId"), Some("P<1>"));
    }

    #[test]
    fn test_missing_child_is_error() {
        let doc = XmlElement::parse("<a><b>1</b></a>").unwrap();
        assert_eq!(doc.child_i64("b").unwrap(), 1);
        assert!(doc.require_child("c").is_err());
    }

    #[test]
    fn test_unbalanced_document_is_error() {
        assert!(XmlElement::parse("<a><b></a>").is_err());
        assert!(XmlElement::parse("").is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("FALSE"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
