//! Plain-text driver, with optional ZIP wrapping.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::EbookDriver;
use crate::error::{Error, Result};
use crate::model::{Cover, EbookData, EbookMeta};
use crate::util;

/// Archive entry stems that may hold a cover image.
const COVER_STEMS: &[&str] = &["cover", "img", "image", "cover_0", "img_0", "image_0"];

/// Driver for plain text files, possibly zipped, bound to one path.
pub struct TxtDriver {
    path: PathBuf,
    source: Option<Vec<u8>>,
}

impl TxtDriver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source: None,
        }
    }

    /// Raw text bytes: the first `.txt` entry of a ZIP container, or the
    /// file itself when it is not an archive.
    fn source(&mut self) -> Result<&[u8]> {
        let bytes = match self.source.take() {
            Some(bytes) => bytes,
            None => self.load_source()?,
        };
        Ok(self.source.insert(bytes))
    }

    fn load_source(&self) -> Result<Vec<u8>> {
        let file = File::open(&self.path)?;
        match ZipArchive::new(file) {
            Ok(mut archive) => {
                let txt_index = (0..archive.len()).find(|&i| {
                    archive
                        .by_index(i)
                        .is_ok_and(|entry| has_extension(entry.name(), "txt"))
                });
                let Some(index) = txt_index else {
                    return Err(Error::Parse("ZIP archive has no .txt entry".into()));
                };
                let mut entry = archive.by_index(index)?;
                debug!(entry = entry.name(), "reading text from archive");
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                Ok(buf)
            }
            Err(_) => Ok(std::fs::read(&self.path)?),
        }
    }
}

impl EbookDriver for TxtDriver {
    /// The first three lines must be valid UTF-8 for the file to count
    /// as text.
    fn is_valid(&mut self) -> bool {
        let Ok(bytes) = self.source() else {
            return false;
        };
        std::str::from_utf8(head_lines(bytes, 3)).is_ok()
    }

    fn meta(&mut self) -> Result<EbookMeta> {
        let bytes = self.source()?;
        let text = util::decode_text(bytes, None);
        let title = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        Ok(EbookMeta::new(title))
    }

    fn data(&mut self) -> Result<Vec<EbookData>> {
        let bytes = self.source()?;
        let text = util::decode_text(bytes, None).trim().to_string();
        let title = memchr::memchr(b'\n', text.as_bytes())
            .map(|pos| text[..pos].trim().to_string());
        Ok(vec![EbookData {
            text,
            title,
            ..EbookData::default()
        }])
    }

    /// A zipped text may carry its cover as a sibling archive entry with
    /// a well-known name.
    fn cover(&mut self) -> Result<Option<Cover>> {
        let file = File::open(&self.path)?;
        let Ok(mut archive) = ZipArchive::new(file) else {
            return Ok(None);
        };

        for i in 0..archive.len() {
            let mut entry = match archive.by_index(i) {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let stem = Path::new(entry.name())
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned());
            if !stem.is_some_and(|s| COVER_STEMS.contains(&s.as_str())) {
                continue;
            }

            let mut bytes = Vec::new();
            if entry.read_to_end(&mut bytes).is_err() {
                continue;
            }
            if let Some(mime) = util::detect_image_mime(&bytes) {
                return Ok(Some(Cover::new(bytes, mime)));
            }
        }

        Ok(None)
    }
}

fn has_extension(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// The prefix of `bytes` covering the first `n` newline-terminated lines
/// (or everything, when there are fewer).
fn head_lines(bytes: &[u8], n: usize) -> &[u8] {
    let mut end = 0;
    for _ in 0..n {
        match memchr::memchr(b'\n', &bytes[end..]) {
            Some(pos) => end += pos + 1,
            None => return bytes,
        }
    }
    &bytes[..end]
}
