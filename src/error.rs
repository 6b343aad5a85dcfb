//! Error types for tome operations.

use thiserror::Error;

/// Errors that can occur while probing or extracting an ebook.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed or truncated container structure: bad magic, missing
    /// required element, unreadable archive entry, unparseable date.
    #[error("Malformed ebook: {0}")]
    Parse(String),

    /// Malformed PalmDOC compressed stream.
    #[error("PalmDOC decode error: {0}")]
    Decode(String),

    /// Structurally valid input using a feature this crate does not
    /// implement (HUFF/CDIC compression, unknown EPUB package version).
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// The file could not be opened for reading at all.
    #[error("File is not readable: {0}")]
    FileNotReadable(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
