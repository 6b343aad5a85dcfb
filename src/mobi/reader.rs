//! MOBI driver: PalmDB container parsing and text extraction.

use std::path::{Path, PathBuf};

use chrono::Datelike;
use tracing::debug;

use super::cursor::ByteCursor;
use super::headers::{
    COMPRESSION_HUFF_CDIC, COMPRESSION_NONE, COMPRESSION_PALMDOC, ExthMeta, MobiHeader, NULL_INDEX,
    PalmDocHeader, PdbHeader,
};
use super::palmdoc;
use crate::EbookDriver;
use crate::error::{Error, Result};
use crate::model::{Cover, EbookData, EbookMeta};
use crate::util;

/// Driver for MOBI/PalmDOC files, bound to one path.
///
/// The header bundle is parsed on first access and cached for the lifetime
/// of the driver; text and cover extraction reuse it.
pub struct MobiDriver {
    path: PathBuf,
    parsed: Option<MobiFile>,
}

struct MobiFile {
    raw: Vec<u8>,
    pdb: PdbHeader,
    palmdoc: PalmDocHeader,
    mobi: MobiHeader,
    exth: ExthMeta,
}

impl MobiDriver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            parsed: None,
        }
    }

    fn parsed(&mut self) -> Result<&MobiFile> {
        let file = match self.parsed.take() {
            Some(file) => file,
            None => self.load()?,
        };
        Ok(self.parsed.insert(file))
    }

    /// One strict forward pass over the container; any failure is fatal
    /// and leaves no partial result.
    fn load(&self) -> Result<MobiFile> {
        let raw = std::fs::read(&self.path)?;
        if raw.len() < 68 || &raw[60..68] != b"BOOKMOBI" {
            return Err(Error::Parse("missing BOOKMOBI signature".into()));
        }

        let mut cur = ByteCursor::new(&raw);
        let pdb = PdbHeader::parse(&mut cur)?;
        let record0 = pdb
            .records
            .first()
            .ok_or_else(|| Error::Parse("PalmDB has no records".into()))?;

        cur.seek(record0.data_offset as usize)?;
        let palmdoc = PalmDocHeader::parse(&mut cur)?;
        let mobi = MobiHeader::parse(&mut cur)?;
        let exth = ExthMeta::parse(&mut cur, mobi.encoding_hint())?;

        debug!(
            records = pdb.records.len(),
            text_records = palmdoc.record_count,
            compression = palmdoc.compression,
            "parsed MOBI container"
        );

        Ok(MobiFile {
            raw,
            pdb,
            palmdoc,
            mobi,
            exth,
        })
    }
}

impl MobiFile {
    /// Full book title: `full_name_length` bytes at record 0 plus
    /// `full_name_offset`.
    fn title(&self) -> Result<String> {
        let record0 = self
            .pdb
            .records
            .first()
            .ok_or_else(|| Error::Parse("PalmDB has no records".into()))?;
        let begin = record0.data_offset as usize + self.mobi.full_name_offset as usize;
        let end = begin + self.mobi.full_name_length as usize;
        if end > self.raw.len() {
            return Err(Error::Parse(format!(
                "full name at {begin}..{end} is outside the file"
            )));
        }
        Ok(util::decode_text(&self.raw[begin..end], self.mobi.encoding_hint()).into_owned())
    }
}

impl EbookDriver for MobiDriver {
    fn is_valid(&mut self) -> bool {
        self.parsed().is_ok()
    }

    fn meta(&mut self) -> Result<EbookMeta> {
        let file = self.parsed()?;
        let mut meta = EbookMeta::new(file.title()?);
        meta.author = file.exth.author.clone();
        meta.publisher = file.exth.publisher.clone();
        meta.isbn = file.exth.isbn.clone();
        meta.description = file.exth.description.clone();
        meta.language = file.exth.language.clone();
        meta.publish_year = file.exth.publish_date.map(|d| d.year());
        meta.publish_month = file.exth.publish_date.map(|d| d.month());
        meta.publish_day = file.exth.publish_date.map(|d| d.day());
        Ok(meta)
    }

    fn data(&mut self) -> Result<Vec<EbookData>> {
        let file = self.parsed()?;

        match file.palmdoc.compression {
            COMPRESSION_NONE | COMPRESSION_PALMDOC => {}
            COMPRESSION_HUFF_CDIC => {
                return Err(Error::Unsupported("HUFF/CDIC compression".into()));
            }
            other => {
                return Err(Error::Parse(format!("unknown compression code {other}")));
            }
        }

        let flags = file.mobi.extra_record_data_flags;
        let mut text = Vec::new();
        for i in 1..=file.palmdoc.record_count as usize {
            let Some(begin) = file.pdb.records.get(i).map(|r| r.data_offset as usize) else {
                continue;
            };
            let Some(end) = file.pdb.records.get(i + 1).map(|r| r.data_offset as usize) else {
                continue;
            };
            if end > file.raw.len() {
                return Err(Error::Parse(format!(
                    "record {i} at {begin}..{end} is outside the file"
                )));
            }

            let record = &file.raw[begin..end];
            let extra = record_extra_size(record, flags)?;
            let content = &record[..record.len() - extra];

            match file.palmdoc.compression {
                COMPRESSION_PALMDOC => text.extend_from_slice(&palmdoc::decompress(content)?),
                _ => text.extend_from_slice(content),
            }
        }

        debug!(bytes = text.len(), "assembled MOBI text");

        Ok(vec![EbookData {
            text: util::decode_text(&text, file.mobi.encoding_hint()).into_owned(),
            title: Some(file.title()?),
            ..EbookData::default()
        }])
    }

    fn cover(&mut self) -> Result<Option<Cover>> {
        let file = self.parsed()?;
        let Some(cover_offset) = file.exth.cover_offset else {
            return Ok(None);
        };
        if file.mobi.first_image_index == NULL_INDEX {
            return Ok(None);
        }

        let index = file.mobi.first_image_index as usize + cover_offset as usize;
        let Some(begin) = file.pdb.records.get(index).map(|r| r.data_offset as usize) else {
            return Ok(None);
        };
        let end = file
            .pdb
            .records
            .get(index + 1)
            .map(|r| r.data_offset as usize)
            .unwrap_or(file.raw.len());
        if begin > end || end > file.raw.len() {
            return Ok(None);
        }

        let bytes = &file.raw[begin..end];
        Ok(util::detect_image_mime(bytes).map(|mime| Cover::new(bytes.to_vec(), mime)))
    }
}

/// Total size of the flag-driven trailing fields at the end of a text
/// record. Bits 15 down to 1 each contribute one backward variable-length
/// field; bit 0 adds `(last_byte & 0x3) + 1` multibyte-overlap bytes.
pub(crate) fn record_extra_size(data: &[u8], flags: u16) -> Result<usize> {
    let mut pos = data.len() as isize - 1;
    let mut extra = 0usize;

    for bit in (1..=15u16).rev() {
        if flags & (1 << bit) != 0 {
            let (size, byte_count, new_pos) = backward_var_len(data, pos)?;
            pos = new_pos - (size as isize - byte_count as isize);
            extra += size;
        }
    }

    if flags & 0x1 != 0 {
        if pos < 0 || pos as usize >= data.len() {
            return Err(Error::Parse(
                "multibyte-overlap trailer outside the record".into(),
            ));
        }
        extra += ((data[pos as usize] & 0x3) + 1) as usize;
    }

    if extra > data.len() {
        return Err(Error::Parse(format!(
            "trailing data size {extra} exceeds record length {}",
            data.len()
        )));
    }
    Ok(extra)
}

/// Decode one variable-length integer backward from `pos`. Each byte
/// contributes 7 bits; a set high bit terminates the scan, which reads at
/// most 4 bytes. Returns `(value, bytes_read, next_pos)`.
fn backward_var_len(data: &[u8], mut pos: isize) -> Result<(usize, usize, isize)> {
    let mut size = 0usize;
    let mut byte_count = 0usize;
    let mut shift = 0u32;

    while byte_count < 4 {
        if pos < 0 || pos as usize >= data.len() {
            return Err(Error::Parse(
                "trailing field runs past the start of the record".into(),
            ));
        }
        let byte = data[pos as usize];
        pos -= 1;
        size |= ((byte & 0x7F) as usize) << shift;
        shift += 7;
        byte_count += 1;
        if byte & 0x80 != 0 {
            break;
        }
    }

    Ok((size, byte_count, pos))
}
