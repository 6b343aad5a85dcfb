//! EPUB driver: OPF package metadata and spine-ordered chapter assembly.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use chrono::Datelike;
use tracing::debug;
use zip::ZipArchive;

use crate::EbookDriver;
use crate::error::{Error, Result};
use crate::model::{Cover, EbookData, EbookMeta, Style};
use crate::util;
use crate::xml::{self, XmlElement};

/// Driver for EPUB 2/3 files, bound to one path.
///
/// The OPF `<package>` element is located through the
/// `META-INF/container.xml` indirection on first access and cached for the
/// lifetime of the driver.
pub struct EpubDriver {
    path: PathBuf,
    package: Option<PackageDoc>,
}

struct PackageDoc {
    root: XmlElement,
    /// Directory of the rootfile inside the archive; spine hrefs are
    /// resolved against it.
    directory: String,
}

impl PackageDoc {
    /// Package version as the original attribute's integer part
    /// (`"3.0"` reads as 3, anything unparseable as 0).
    fn version(&self) -> u32 {
        let attr = self.root.attr("version").unwrap_or_default();
        let digits: String = attr.trim().chars().take_while(char::is_ascii_digit).collect();
        digits.parse().unwrap_or(0)
    }
}

impl EpubDriver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            package: None,
        }
    }

    fn package(&mut self) -> Result<&PackageDoc> {
        let pkg = match self.package.take() {
            Some(pkg) => pkg,
            None => self.load_package()?,
        };
        Ok(self.package.insert(pkg))
    }

    fn load_package(&self) -> Result<PackageDoc> {
        let file = File::open(&self.path)?;
        let mut archive = ZipArchive::new(file)?;

        let container = read_entry(&mut archive, "META-INF/container.xml")?;
        let container_doc = xml::parse(&container)?;
        let rootfile = container_doc
            .first("rootfile")
            .ok_or_else(|| Error::Parse("no rootfile in container.xml".into()))?;
        let full_path = rootfile
            .attr("full-path")
            .ok_or_else(|| Error::Parse("rootfile has no full-path attribute".into()))?
            .to_string();

        let directory = Path::new(&full_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let opf = read_entry(&mut archive, &full_path)?;
        let doc = xml::parse(&opf)?;
        let root = if doc.local_name() == "package" {
            doc
        } else {
            doc.first("package")
                .cloned()
                .ok_or_else(|| Error::Parse("OPF document has no package element".into()))?
        };

        debug!(rootfile = %full_path, "located EPUB package document");
        Ok(PackageDoc { root, directory })
    }
}

impl EbookDriver for EpubDriver {
    fn is_valid(&mut self) -> bool {
        self.package().is_ok()
    }

    fn meta(&mut self) -> Result<EbookMeta> {
        let pkg = self.package()?;
        let version = pkg.version();
        if version != 2 && version != 3 {
            return Err(Error::Unsupported(format!("EPUB package version {version}")));
        }

        let metadata = pkg
            .root
            .first("metadata")
            .ok_or_else(|| Error::Parse("package has no metadata element".into()))?;

        let mut meta = EbookMeta::new(make_title(metadata));
        meta.author = make_author(metadata);
        meta.publisher = metadata.first("publisher").map(XmlElement::text);
        meta.isbn = make_isbn(metadata, version);
        meta.description = metadata
            .first("description")
            .map(|n| n.text().trim().to_string());
        meta.language = metadata.first("language").map(XmlElement::text);
        meta.license = metadata.first("rights").map(XmlElement::text);
        (meta.publish_year, meta.publish_month, meta.publish_day) = make_publish_date(metadata)?;
        Ok(meta)
    }

    fn data(&mut self) -> Result<Vec<EbookData>> {
        let path = self.path.clone();
        let pkg = self.package()?;
        let version = pkg.version();

        let manifest = pkg
            .root
            .first("manifest")
            .ok_or_else(|| Error::Parse("package has no manifest element".into()))?;
        let spine = pkg
            .root
            .first("spine")
            .ok_or_else(|| Error::Parse("package has no spine element".into()))?;
        let items = manifest.elements_by_tag("item");

        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut data = Vec::new();
        for itemref in spine.elements_by_tag("itemref") {
            let id = itemref
                .attr("idref")
                .ok_or_else(|| Error::Parse("itemref has no idref attribute".into()))?;
            let item = items
                .iter()
                .find(|item| item.attr("id") == Some(id))
                .ok_or_else(|| Error::Parse(format!("spine references unknown item {id:?}")))?;

            // https://www.w3.org/publishing/epub3/epub-packages.html#app-item-properties-vocab
            let navigation = if version == 2 {
                None
            } else {
                Some(
                    item.attr("properties")
                        .is_some_and(|p| p.split_whitespace().any(|token| token == "nav")),
                )
            };

            let href = item
                .attr("href")
                .ok_or_else(|| Error::Parse(format!("manifest item {id:?} has no href")))?;
            let entry_path = join_entry_path(&pkg.directory, href);
            let content = read_entry(&mut archive, &entry_path)?;
            let doc = xml::parse(&content)?;

            let head = doc.first("head");
            let title = head.and_then(|h| h.first("title")).map(XmlElement::text);

            let mut styles = Vec::new();
            if let Some(head) = head {
                for link in head.elements_by_tag("link") {
                    if link.attr("rel") == Some("stylesheet") {
                        styles.push(Style::link(link.attr("href").unwrap_or_default()));
                    }
                }
                for style in head.elements_by_tag("style") {
                    styles.push(Style::css(style.text()));
                }
            }

            let body = doc
                .first("body")
                .ok_or_else(|| Error::Parse(format!("{entry_path:?} has no body element")))?;
            data.push(EbookData {
                text: wrap_body(body),
                title,
                styles,
                navigation,
                ..EbookData::default()
            });
        }

        Ok(data)
    }

    fn cover(&mut self) -> Result<Option<Cover>> {
        let path = self.path.clone();
        let pkg = self.package()?;
        let Some(manifest) = pkg.root.first("manifest") else {
            return Ok(None);
        };
        let items = manifest.elements_by_tag("item");

        // EPUB 3 marks the image in the manifest itself; EPUB 2 points at
        // it through a meta element.
        let mut cover_item = items.iter().find(|item| {
            item.attr("properties")
                .is_some_and(|p| p.split_whitespace().any(|token| token == "cover-image"))
        });
        if cover_item.is_none()
            && let Some(metadata) = pkg.root.first("metadata")
            && let Some(id) = metadata
                .elements_by_tag("meta")
                .iter()
                .find(|m| m.attr("name") == Some("cover"))
                .and_then(|m| m.attr("content"))
        {
            cover_item = items.iter().find(|item| item.attr("id") == Some(id));
        }

        let Some(href) = cover_item.and_then(|item| item.attr("href")) else {
            return Ok(None);
        };

        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;
        let bytes = read_entry(&mut archive, &join_entry_path(&pkg.directory, href))?;
        Ok(util::detect_image_mime(&bytes).map(|mime| Cover::new(bytes, mime)))
    }
}

fn make_title(metadata: &XmlElement) -> String {
    let titles: Vec<String> = metadata
        .elements_by_tag("title")
        .iter()
        .map(|n| n.text())
        .collect();
    titles.join(", ")
}

fn make_author(metadata: &XmlElement) -> Option<String> {
    let creators = metadata.elements_by_tag("creator");
    if creators.is_empty() {
        return None;
    }

    let mut authors = Vec::new();
    let mut all_authors = Vec::new();
    for creator in &creators {
        let name = creator.text();
        // Both attribute spellings occur in the wild.
        let role = creator.attr("role").or_else(|| creator.attr("opf:role"));
        if role == Some("aut") {
            authors.push(name.clone());
        }
        all_authors.push(name);
    }

    if authors.is_empty() {
        Some(all_authors.join(", "))
    } else {
        Some(authors.join(", "))
    }
}

fn make_isbn(metadata: &XmlElement, version: u32) -> Option<String> {
    let identifiers = metadata.elements_by_tag("identifier");
    match version {
        3 => identifiers.iter().find_map(|node| {
            let value = node.text();
            value
                .strip_prefix("urn:isbn:")
                .map(|isbn| isbn.to_string())
        }),
        2 => identifiers
            .iter()
            .find(|node| {
                node.attr("opf:scheme")
                    .or_else(|| node.attr("scheme"))
                    .is_some_and(|scheme| scheme == "ISBN")
            })
            .map(|node| node.text()),
        _ => None,
    }
}

type DateParts = (Option<i32>, Option<u32>, Option<u32>);

/// dc:date, which may be a year, a year-month, or a full date/timestamp.
fn make_publish_date(metadata: &XmlElement) -> Result<DateParts> {
    let Some(node) = metadata.first("date") else {
        return Ok((None, None, None));
    };
    let text = node.text();
    let text = text.trim();

    match text.len() {
        4 => {
            let year = parse_number(text)?;
            Ok((Some(year), None, None))
        }
        7 => {
            let (year, month) = text
                .split_once('-')
                .ok_or_else(|| Error::Parse(format!("malformed year-month date {text:?}")))?;
            Ok((Some(parse_number(year)?), Some(parse_number(month)?), None))
        }
        _ => {
            let date = util::parse_full_date(text)?;
            Ok((Some(date.year()), Some(date.month()), Some(date.day())))
        }
    }
}

fn parse_number<T: std::str::FromStr>(s: &str) -> Result<T> {
    s.parse()
        .map_err(|_| Error::Parse(format!("malformed date component {s:?}")))
}

/// Serialized `<body>` children wrapped in a `<div>` that carries over the
/// body's class/style attributes verbatim.
fn wrap_body(body: &XmlElement) -> String {
    let mut out = String::from("<div");
    if let Some(class) = body.attr("class") {
        out.push_str(" class=\"");
        out.push_str(class);
        out.push('"');
    }
    if let Some(style) = body.attr("style") {
        out.push_str(" style=\"");
        out.push_str(style);
        out.push('"');
    }
    out.push('>');
    for child in body.children() {
        out.push_str(&child.to_xml());
    }
    out.push_str("</div>");
    out
}

fn join_entry_path(directory: &str, href: &str) -> String {
    if directory.is_empty() || directory == "." {
        href.to_string()
    } else {
        format!("{directory}/{href}")
    }
}

/// Read one archive entry, retrying with a percent-decoded name for
/// malformed EPUBs whose manifest hrefs are URL-encoded.
fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            return Ok(contents);
        }
        Err(zip::result::ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let decoded = percent_encoding::percent_decode_str(name)
        .decode_utf8()
        .map_err(|_| Error::Parse(format!("invalid UTF-8 in entry path {name:?}")))?;
    let mut entry = archive.by_name(&decoded)?;
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;
    Ok(contents)
}
