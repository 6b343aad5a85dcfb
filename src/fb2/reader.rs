//! FB2 (FictionBook) driver.
//!
//! FictionBook documents can be large, so the interesting elements
//! (`description`, `stylesheet`, `body`) are located with a streaming
//! scan and only those subtrees are expanded into trees, each cached
//! independently.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;
use zip::ZipArchive;

use crate::EbookDriver;
use crate::error::{Error, Result};
use crate::model::{Cover, EbookData, EbookMeta, Epigraph, Style};
use crate::util;
use crate::xml::{self, XmlElement, XmlNode};

/// Child tags serialized verbatim when assembling section text.
const VERBATIM_TAGS: &[&str] = &[
    "p",
    "table",
    "strong",
    "emphasis",
    "style",
    "strikethrough",
    "sub",
    "sup",
    "code",
];

/// Inline tags allowed inside a `text-author` line.
const AUTHOR_INLINE_TAGS: &[&str] = &[
    "strong",
    "emphasis",
    "style",
    "strikethrough",
    "sub",
    "sup",
    "code",
];

/// Driver for FB2 files (plain or zipped), bound to one path.
pub struct Fb2Driver {
    path: PathBuf,
    source: Option<String>,
    description: Option<XmlElement>,
    stylesheet: Option<Option<XmlElement>>,
    body: Option<XmlElement>,
}

impl Fb2Driver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source: None,
            description: None,
            stylesheet: None,
            body: None,
        }
    }

    /// The XML text: the first entry of a ZIP container, or the file
    /// itself when it is not an archive.
    fn source(&mut self) -> Result<&str> {
        let text = match self.source.take() {
            Some(text) => text,
            None => self.load_source()?,
        };
        Ok(self.source.insert(text))
    }

    fn load_source(&self) -> Result<String> {
        let file = File::open(&self.path)?;
        let bytes = match ZipArchive::new(file) {
            Ok(mut archive) => {
                if archive.len() == 0 {
                    return Err(Error::Parse("ZIP archive has no entries".into()));
                }
                let mut entry = archive.by_index(0)?;
                debug!(entry = entry.name(), "reading FB2 from archive");
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                buf
            }
            Err(_) => std::fs::read(&self.path)?,
        };

        let hint = util::extract_xml_encoding(&bytes).map(str::to_owned);
        Ok(util::decode_text(util::strip_bom(&bytes), hint.as_deref()).into_owned())
    }

    fn description(&mut self) -> Result<&XmlElement> {
        let node = match self.description.take() {
            Some(node) => node,
            None => {
                let source = self.source()?;
                find_first(source, "description")?
                    .ok_or_else(|| Error::Parse("document has no description element".into()))?
            }
        };
        Ok(self.description.insert(node))
    }

    fn stylesheet(&mut self) -> Result<Option<&XmlElement>> {
        let cached = match self.stylesheet.take() {
            Some(cached) => cached,
            None => {
                let source = self.source()?;
                find_first(source, "stylesheet")?
            }
        };
        Ok(self.stylesheet.insert(cached).as_ref())
    }

    fn body(&mut self) -> Result<&XmlElement> {
        let node = match self.body.take() {
            Some(node) => node,
            None => {
                let source = self.source()?;
                find_first(source, "body")?
                    .ok_or_else(|| Error::Parse("document has no body element".into()))?
            }
        };
        Ok(self.body.insert(node))
    }
}

impl EbookDriver for Fb2Driver {
    fn is_valid(&mut self) -> bool {
        self.description().is_ok()
    }

    fn meta(&mut self) -> Result<EbookMeta> {
        let description = self.description()?;
        let title_info = description
            .first("title-info")
            .ok_or_else(|| Error::Parse("description has no title-info element".into()))?;
        let publish_info = description.first("publish-info");

        let title = title_info
            .first("book-title")
            .map(XmlElement::text)
            .ok_or_else(|| Error::Parse("title-info has no book-title element".into()))?;

        let mut meta = EbookMeta::new(title);
        meta.author = Some(make_author(title_info)?);
        meta.publisher = publish_info.and_then(|pi| pi.first("publisher").map(XmlElement::text));
        meta.isbn = publish_info.and_then(|pi| pi.first("isbn").map(XmlElement::text));
        meta.description = make_annotation(title_info);
        meta.language = title_info.first("lang").map(XmlElement::text);
        // FB2 has no license field.
        meta.license = None;
        meta.publish_year = publish_info
            .and_then(|pi| pi.first("year"))
            .and_then(|n| n.text().trim().parse().ok());
        Ok(meta)
    }

    fn data(&mut self) -> Result<Vec<EbookData>> {
        let styles = match self.stylesheet()? {
            Some(node) => vec![Style::css(node.text())],
            None => Vec::new(),
        };
        let body = self.body()?;

        let mut data = Vec::new();
        for section in body.elements_by_tag("section") {
            let title = section.first("title").map(XmlElement::text);
            let text = make_text(section, false);
            let annotation = section.first("annotation").map(|n| make_text(n, false));

            let mut epigraphs = Vec::new();
            for node in section.elements_by_tag("epigraph") {
                let text = make_text(node, false);
                if text.is_empty() {
                    continue;
                }
                let authors = node
                    .elements_by_tag("text-author")
                    .into_iter()
                    .map(make_author_text)
                    .collect();
                epigraphs.push(Epigraph { text, authors });
            }

            data.push(EbookData {
                text,
                title,
                styles: styles.clone(),
                navigation: None,
                annotation,
                epigraphs,
            });
        }

        Ok(data)
    }

    fn cover(&mut self) -> Result<Option<Cover>> {
        let description = self.description()?;
        let Some(image) = description
            .first("coverpage")
            .and_then(|c| c.first("image"))
        else {
            return Ok(None);
        };
        let Some(href) = image
            .attr("l:href")
            .or_else(|| image.attr("xlink:href"))
            .or_else(|| image.attr("href"))
        else {
            return Ok(None);
        };
        let Some(id) = href.strip_prefix('#') else {
            return Ok(None);
        };
        let id = id.to_string();

        let source = self.source()?;
        let Some(binary) = find_binary(source, &id)? else {
            return Ok(None);
        };

        let declared_mime = binary.attr("content-type").map(str::to_owned);
        let text = binary.text();
        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let data = BASE64
            .decode(cleaned.as_bytes())
            .map_err(|e| Error::Parse(format!("invalid base64 in binary {id:?}: {e}")))?;

        let mime = declared_mime.or_else(|| util::detect_image_mime(&data).map(str::to_owned));
        Ok(mime.map(|mime| Cover::new(data, mime)))
    }
}

/// Find the first element with the given local name and expand it.
fn find_first(source: &str, name: &str) -> Result<Option<XmlElement>> {
    let mut reader = Reader::from_str(source);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if xml::name_matches(e.name().as_ref(), name) => {
                return xml::expand_subtree(&mut reader, &e).map(Some);
            }
            Ok(Event::Empty(e)) if xml::name_matches(e.name().as_ref(), name) => {
                return xml::element_from_start(&e).map(Some);
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }
}

/// Find the `<binary>` element carrying the given id.
fn find_binary(source: &str, id: &str) -> Result<Option<XmlElement>> {
    let mut reader = Reader::from_str(source);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e))
                if xml::name_matches(e.name().as_ref(), "binary") && has_id(&e, id) =>
            {
                return xml::expand_subtree(&mut reader, &e).map(Some);
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }
}

fn has_id(e: &BytesStart, id: &str) -> bool {
    e.attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == b"id" && attr.value.as_ref() == id.as_bytes())
}

/// `first [middle] last` per author, falling back to the nickname; the
/// author element is required by the schema.
fn make_author(title_info: &XmlElement) -> Result<String> {
    let author_nodes = title_info.elements_by_tag("author");
    if author_nodes.is_empty() {
        return Err(Error::Parse("title-info has no author element".into()));
    }

    let mut authors = Vec::new();
    for node in author_nodes {
        let first = node.first("first-name").map(XmlElement::text);
        let middle = node.first("middle-name").map(XmlElement::text);
        let last = node.first("last-name").map(XmlElement::text);

        let author = match (first, last) {
            (Some(first), Some(last)) => match middle {
                Some(middle) => format!("{first} {middle} {last}"),
                None => format!("{first} {last}"),
            },
            _ => node
                .first("nickname")
                .map(XmlElement::text)
                .ok_or_else(|| Error::Parse("author has neither a name nor a nickname".into()))?,
        };
        authors.push(author);
    }

    Ok(authors.join(", "))
}

/// The `p`/`table` children of the title-info annotation, serialized.
fn make_annotation(title_info: &XmlElement) -> Option<String> {
    let annotation = title_info.first("annotation")?;
    let text: String = annotation
        .children()
        .iter()
        .filter_map(|child| match child {
            XmlNode::Element(el) if matches!(el.local_name(), "p" | "table") => Some(el.to_xml()),
            _ => None,
        })
        .collect();
    Some(text.trim().to_string())
}

/// Depth-first text assembly over a section-like element.
///
/// In the default context, text nodes pass through with a trailing
/// newline; in the verse context (`row_frame`), each text node becomes its
/// own paragraph. Verbatim tags keep their markup, `cite` becomes a
/// blockquote, and poems render stanza by stanza, verse by verse.
fn make_text(node: &XmlElement, row_frame: bool) -> String {
    let mut out = String::new();
    for child in node.children() {
        match child {
            XmlNode::Text(t) => {
                if row_frame {
                    out.push_str("<p>");
                    out.push_str(t);
                    out.push_str("</p>");
                } else {
                    out.push_str(t);
                    out.push('\n');
                }
            }
            XmlNode::Element(el) => {
                let tag = el.local_name();
                if VERBATIM_TAGS.contains(&tag) {
                    out.push_str(&el.to_xml());
                }
                if tag == "cite" {
                    out.push_str("<blockquote>");
                    out.push_str(&make_text(el, false));
                    out.push_str("</blockquote>");
                }
                if tag == "poem" {
                    for stanza in el.elements_by_tag("stanza") {
                        for verse in stanza.elements_by_tag("v") {
                            out.push_str(&make_text(verse, true));
                        }
                    }
                }
            }
        }
    }
    out
}

/// A `text-author` line: only direct children are examined, and only a
/// fixed set of inline tags keeps its markup.
fn make_author_text(node: &XmlElement) -> String {
    let mut parts = Vec::new();
    for child in node.children() {
        match child {
            XmlNode::Element(el) if AUTHOR_INLINE_TAGS.contains(&el.local_name()) => {
                parts.push(el.to_xml());
            }
            XmlNode::Element(_) => {}
            XmlNode::Text(t) => parts.push(format!("{t}\n")),
        }
    }
    parts.join(" ")
}
