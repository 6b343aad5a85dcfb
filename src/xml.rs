//! A small XML tree built from quick-xml events.
//!
//! The format drivers need DOM-ish access (descendant queries by tag name,
//! attribute lookup, markup serialization) over documents that are small
//! once the interesting subtree is isolated. Nodes are variant-tagged
//! (element or text) with ordered children; namespace prefixes are kept in
//! the serialized form but ignored by tag-name queries.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::util;

#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlNode {
    /// Serialize this node's markup (escaped text, or the element
    /// including its own tag).
    pub fn to_xml(&self) -> String {
        match self {
            XmlNode::Element(el) => el.to_xml(),
            XmlNode::Text(t) => quick_xml::escape::escape(t.as_str()).into_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct XmlElement {
    /// Qualified name as written in the source (`dc:title`).
    name: String,
    /// Attribute values are kept exactly as written (still escaped), so
    /// serialization reproduces the source markup.
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag name with any namespace prefix stripped.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Attribute value by exact qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All descendant elements whose local name matches, in document order.
    /// The element itself is never included.
    pub fn elements_by_tag(&self, name: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        self.collect_by_tag(name, &mut found);
        found
    }

    /// First descendant element whose local name matches.
    pub fn first(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if let XmlNode::Element(el) = child {
                if el.local_name() == name {
                    return Some(el);
                }
                if let Some(hit) = el.first(name) {
                    return Some(hit);
                }
            }
        }
        None
    }

    fn collect_by_tag<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if let XmlNode::Element(el) = child {
                if el.local_name() == name {
                    found.push(el);
                }
                el.collect_by_tag(name, found);
            }
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.append_text(&mut out);
        out
    }

    fn append_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(el) => el.append_text(out),
            }
        }
    }

    /// Serialize this element's markup, including its own tag.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(v);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(&quick_xml::escape::escape(t.as_str())),
                XmlNode::Element(el) => el.write_xml(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn local(name: &str) -> &str {
    match name.rfind(':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Parse a whole document and return its root element.
///
/// The bytes are decoded first (UTF-8, then the declared encoding, then
/// CP1252), so documents in legacy encodings parse too.
pub fn parse(bytes: &[u8]) -> Result<XmlElement> {
    let hint = util::extract_xml_encoding(bytes).map(str::to_owned);
    let text = util::decode_text(util::strip_bom(bytes), hint.as_deref());
    parse_str(&text)
}

pub fn parse_str(text: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(text);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let root = element_from_start(&e)?;
                return read_subtree(&mut reader, root);
            }
            Ok(Event::Empty(e)) => return element_from_start(&e),
            Ok(Event::Eof) => return Err(Error::Parse("document has no root element".into())),
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }
}

/// Build the element for a `Start` event that has already been consumed
/// from `reader`, reading events until its matching `End`.
///
/// This is how the FB2 driver expands one interesting element out of a
/// streamed document without materializing the rest.
pub fn expand_subtree(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<XmlElement> {
    let root = element_from_start(start)?;
    read_subtree(reader, root)
}

fn read_subtree(reader: &mut Reader<&[u8]>, root: XmlElement) -> Result<XmlElement> {
    let mut stack: Vec<XmlElement> = vec![root];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element_from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let el = element_from_start(&e)?;
                attach(&mut stack, XmlNode::Element(el))?;
            }
            Ok(Event::Text(t)) => {
                let raw = as_str(t.as_ref())?;
                let text = quick_xml::escape::unescape(raw)
                    .map_err(|e| Error::Parse(format!("bad entity reference: {e}")))?;
                // Whitespace-only nodes are formatting noise; anything
                // else is kept untrimmed so inline markup serializes
                // byte-for-byte.
                if !text.trim().is_empty() {
                    attach(&mut stack, XmlNode::Text(text.into_owned()))?;
                }
            }
            Ok(Event::CData(t)) => {
                let text = as_str(t.as_ref())?.to_owned();
                attach(&mut stack, XmlNode::Text(text))?;
            }
            Ok(Event::End(_)) => {
                let el = match stack.pop() {
                    Some(el) => el,
                    None => return Err(Error::Parse("unbalanced closing tag".into())),
                };
                if stack.is_empty() {
                    return Ok(el);
                }
                attach(&mut stack, XmlNode::Element(el))?;
            }
            Ok(Event::Eof) => {
                return Err(Error::Parse("unexpected end of document inside element".into()));
            }
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }
}

fn attach(stack: &mut Vec<XmlElement>, node: XmlNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None => Err(Error::Parse("content outside of root element".into())),
    }
}

/// Whether a possibly-prefixed qualified name has the given local part.
pub(crate) fn name_matches(qname: &[u8], local_name: &str) -> bool {
    let local = match qname.iter().rposition(|&b| b == b':') {
        Some(i) => &qname[i + 1..],
        None => qname,
    };
    local == local_name.as_bytes()
}

pub(crate) fn element_from_start(e: &BytesStart) -> Result<XmlElement> {
    let name = as_str(e.name().as_ref())?.to_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes().flatten() {
        let key = as_str(attr.key.as_ref())?.to_owned();
        let value = as_str(&attr.value)?.to_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn as_str(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::Parse(format!("invalid UTF-8 in XML: {e}")))
}
