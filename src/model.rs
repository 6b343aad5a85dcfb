//! Value types produced by the format drivers.

/// Bibliographic metadata extracted from an ebook.
///
/// Only the title is guaranteed; every other field is independently
/// optional, including the publish-date parts (a year without a month is
/// legal, as is year+month without a day).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct EbookMeta {
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
    /// May contain markup.
    pub description: Option<String>,
    pub language: Option<String>,
    pub license: Option<String>,
    pub publish_year: Option<i32>,
    pub publish_month: Option<u32>,
    pub publish_day: Option<u32>,
}

impl EbookMeta {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// How a [`Style`] references its CSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    /// `content` is an href to an external stylesheet.
    Link,
    /// `content` is inline CSS text.
    Css,
}

/// A stylesheet attached to a content unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    pub kind: StyleKind,
    pub content: String,
}

impl Style {
    pub fn link(href: impl Into<String>) -> Self {
        Self {
            kind: StyleKind::Link,
            content: href.into(),
        }
    }

    pub fn css(text: impl Into<String>) -> Self {
        Self {
            kind: StyleKind::Css,
            content: text.into(),
        }
    }

    pub fn is_link(&self) -> bool {
        self.kind == StyleKind::Link
    }

    pub fn is_css(&self) -> bool {
        self.kind == StyleKind::Css
    }
}

/// An epigraph preceding an FB2 section, with optional attributed authors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Epigraph {
    pub text: String,
    pub authors: Vec<String>,
}

/// One logical content unit: an EPUB spine item, an FB2 section, or the
/// whole document for MOBI and plain text.
#[derive(Debug, Clone, Default)]
pub struct EbookData {
    /// HTML fragment.
    pub text: String,
    pub title: Option<String>,
    pub styles: Vec<Style>,
    /// EPUB 3 nav-document marker. `None` when the format (or package
    /// version) has no such concept, `Some(false)`/`Some(true)` otherwise.
    pub navigation: Option<bool>,
    /// FB2 section annotation, absent elsewhere.
    pub annotation: Option<String>,
    /// FB2 section epigraphs, empty elsewhere.
    pub epigraphs: Vec<Epigraph>,
}

/// A cover image: raw bytes plus the sniffed MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub data: Vec<u8>,
    pub mime: String,
}

impl Cover {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
        }
    }
}
