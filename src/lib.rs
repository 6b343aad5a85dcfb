//! # tome
//!
//! A small library for extracting metadata, chapter text, and cover
//! images from ebooks: EPUB 2/3, FictionBook (FB2, plain or zipped),
//! MOBI/PalmDOC, and plain text (plain or zipped).
//!
//! ## Quick Start
//!
//! ```no_run
//! let meta = tome::read_meta("book.epub")?;
//! println!("{} by {}", meta.title, meta.author.as_deref().unwrap_or("?"));
//!
//! for chapter in tome::read_data("book.epub")? {
//!     println!("{:?}: {} bytes", chapter.title, chapter.text.len());
//! }
//! # Ok::<(), tome::Error>(())
//! ```
//!
//! ## Drivers
//!
//! Each format has a driver bound to one file. A driver parses lazily:
//! the container structures are decoded on first access and cached for
//! the driver's lifetime, so consecutive [`EbookDriver::meta`] /
//! [`EbookDriver::data`] / [`EbookDriver::cover`] calls reuse the work.
//! [`open`] probes the formats in a fixed order (EPUB, MOBI, FB2, TXT)
//! and returns the first driver that recognizes the file.

pub mod epub;
pub mod error;
pub mod fb2;
pub mod mobi;
mod model;
pub mod txt;
mod util;
mod xml;

use std::fs::File;
use std::path::Path;

pub use epub::EpubDriver;
pub use error::{Error, Result};
pub use fb2::Fb2Driver;
pub use mobi::MobiDriver;
pub use model::{Cover, EbookData, EbookMeta, Epigraph, Style, StyleKind};
pub use txt::TxtDriver;

/// A format driver bound to one file.
pub trait EbookDriver {
    /// Cheap structural validity probe: attempts the parse and reduces
    /// any failure to `false`. Never fails.
    fn is_valid(&mut self) -> bool;

    /// Bibliographic metadata. Errors are typed and never partial: a
    /// failed parse yields no metadata at all.
    fn meta(&mut self) -> Result<EbookMeta>;

    /// Content units in reading order.
    fn data(&mut self) -> Result<Vec<EbookData>>;

    /// Cover image, when the container carries one.
    fn cover(&mut self) -> Result<Option<Cover>>;
}

/// Probe the file and return the first driver that accepts it.
///
/// The probe order matters: EPUB before MOBI before FB2 before TXT.
/// A ZIP-wrapped FictionBook, for instance, must not be claimed by the
/// text driver.
pub fn open(path: impl AsRef<Path>) -> Result<Box<dyn EbookDriver>> {
    let path = path.as_ref();
    if File::open(path).is_err() {
        return Err(Error::FileNotReadable(path.display().to_string()));
    }

    let mut epub = EpubDriver::new(path);
    if epub.is_valid() {
        return Ok(Box::new(epub));
    }
    let mut mobi = MobiDriver::new(path);
    if mobi.is_valid() {
        return Ok(Box::new(mobi));
    }
    let mut fb2 = Fb2Driver::new(path);
    if fb2.is_valid() {
        return Ok(Box::new(fb2));
    }
    let mut txt = TxtDriver::new(path);
    if txt.is_valid() {
        return Ok(Box::new(txt));
    }

    Err(Error::Unsupported(format!(
        "no driver recognizes {}",
        path.display()
    )))
}

/// Extract metadata from a file of any supported format.
pub fn read_meta(path: impl AsRef<Path>) -> Result<EbookMeta> {
    open(path)?.meta()
}

/// Extract the content units from a file of any supported format.
pub fn read_data(path: impl AsRef<Path>) -> Result<Vec<EbookData>> {
    open(path)?.data()
}

/// Extract the cover image from a file of any supported format.
pub fn read_cover(path: impl AsRef<Path>) -> Result<Option<Cover>> {
    open(path)?.cover()
}
