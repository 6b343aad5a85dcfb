//! PalmDB, PalmDOC, MOBI, and EXTH header parsing.

use chrono::NaiveDate;

use super::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::util;

pub const NULL_INDEX: u32 = 0xFFFF_FFFF;

pub const COMPRESSION_NONE: u16 = 1;
pub const COMPRESSION_PALMDOC: u16 = 2;
pub const COMPRESSION_HUFF_CDIC: u16 = 17480;

/// PalmDB header: 78-byte prologue, one 8-byte info entry per record,
/// then 2 bytes of padding.
#[derive(Debug, Clone)]
#[allow(dead_code)] // Fields are part of the PDB format spec, useful for debugging
pub struct PdbHeader {
    pub name: String,
    pub attributes: u16,
    pub version: u16,
    pub created_at: u32,
    pub modified_at: u32,
    pub backed_up_at: u32,
    pub modification_number: u32,
    pub app_info_id: u32,
    pub sort_info_id: u32,
    pub type_code: [u8; 4],
    pub creator_code: [u8; 4],
    pub unique_id_seed: u32,
    pub next_record_list_id: u32,
    pub records: Vec<RecordInfo>,
}

#[derive(Debug, Clone)]
pub struct RecordInfo {
    pub data_offset: u32,
    pub attributes: u8,
    pub unique_id: [u8; 3],
}

impl PdbHeader {
    pub fn parse(cur: &mut ByteCursor) -> Result<Self> {
        let name_bytes = cur.read_bytes(32)?;
        let name = util::decode_text(name_bytes, None)
            .trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string();

        let attributes = cur.read_u16_be()?;
        let version = cur.read_u16_be()?;
        let created_at = cur.read_u32_be()?;
        let modified_at = cur.read_u32_be()?;
        let backed_up_at = cur.read_u32_be()?;
        let modification_number = cur.read_u32_be()?;
        let app_info_id = cur.read_u32_be()?;
        let sort_info_id = cur.read_u32_be()?;
        let type_code = read_code(cur)?;
        let creator_code = read_code(cur)?;
        let unique_id_seed = cur.read_u32_be()?;
        let next_record_list_id = cur.read_u32_be()?;
        let record_count = cur.read_u16_be()?;

        let mut records = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            let data_offset = cur.read_u32_be()?;
            if let Some(prev) = records.last().map(|r: &RecordInfo| r.data_offset)
                && data_offset < prev
            {
                return Err(Error::Parse(format!(
                    "record offset {data_offset} precedes previous offset {prev}"
                )));
            }
            let attributes = cur.read_u8()?;
            let id = cur.read_bytes(3)?;
            records.push(RecordInfo {
                data_offset,
                attributes,
                unique_id: [id[0], id[1], id[2]],
            });
        }
        cur.skip(2)?; // padding

        Ok(Self {
            name,
            attributes,
            version,
            created_at,
            modified_at,
            backed_up_at,
            modification_number,
            app_info_id,
            sort_info_id,
            type_code,
            creator_code,
            unique_id_seed,
            next_record_list_id,
            records,
        })
    }
}

fn read_code(cur: &mut ByteCursor) -> Result<[u8; 4]> {
    let b = cur.read_bytes(4)?;
    Ok([b[0], b[1], b[2], b[3]])
}

/// PalmDOC header: the fixed 16 bytes at the start of record 0.
#[derive(Debug, Clone)]
pub struct PalmDocHeader {
    pub compression: u16,
    pub text_length: u32,
    pub record_count: u16,
    pub record_size: u16,
}

impl PalmDocHeader {
    pub fn parse(cur: &mut ByteCursor) -> Result<Self> {
        let compression = cur.read_u16_be()?;
        cur.skip(2)?; // unused
        let text_length = cur.read_u32_be()?;
        let record_count = cur.read_u16_be()?;
        let record_size = cur.read_u16_be()?;
        cur.skip(4)?; // current position / encryption, unused here
        Ok(Self {
            compression,
            text_length,
            record_count,
            record_size,
        })
    }
}

/// MOBI header, immediately following the PalmDOC header in record 0.
///
/// Only the fields this crate consumes are retained; they are read at
/// fixed offsets relative to the header start, and the cursor is left at
/// `start + header_length` (the EXTH block) on success.
#[derive(Debug, Clone)]
pub struct MobiHeader {
    pub header_length: u32,
    pub mobi_type: u32,
    pub text_encoding: u32,
    /// Offset of the full book title, relative to the start of record 0.
    pub full_name_offset: u32,
    pub full_name_length: u32,
    pub first_image_index: u32,
    /// Bitmask of variable-length trailers at the end of each text record.
    pub extra_record_data_flags: u16,
}

impl MobiHeader {
    pub fn parse(cur: &mut ByteCursor) -> Result<Self> {
        let start = cur.tell();
        if cur.read_bytes(4)? != b"MOBI" {
            return Err(Error::Parse("missing MOBI header magic".into()));
        }
        let header_length = cur.read_u32_be()?;
        let mobi_type = cur.read_u32_be()?;
        let text_encoding = cur.read_u32_be()?;

        cur.seek(start + 68)?;
        let full_name_offset = cur.read_u32_be()?;
        let full_name_length = cur.read_u32_be()?;

        cur.seek(start + 92)?;
        let first_image_index = cur.read_u32_be()?;

        // The trailer flags only exist when the header is long enough to
        // contain them (Mobipocket 5/6, header length 228 or 232).
        let extra_record_data_flags = if header_length >= 228 {
            cur.seek(start + 226)?;
            cur.read_u16_be()?
        } else {
            0
        };

        cur.seek(start + header_length as usize)?;

        Ok(Self {
            header_length,
            mobi_type,
            text_encoding,
            full_name_offset,
            full_name_length,
            first_image_index,
            extra_record_data_flags,
        })
    }

    /// Encoding label for [`util::decode_text`], from the declared codepage.
    pub fn encoding_hint(&self) -> Option<&'static str> {
        match self.text_encoding {
            65001 => Some("utf-8"),
            1252 => Some("windows-1252"),
            _ => None,
        }
    }
}

/// The EXTH metadata fields this crate maps to [`crate::EbookMeta`].
/// Unknown record types are skipped but still consume their length.
#[derive(Debug, Clone, Default)]
pub struct ExthMeta {
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    pub language: Option<String>,
    pub publish_date: Option<NaiveDate>,
    pub cover_offset: Option<u32>,
}

impl ExthMeta {
    /// Parse the EXTH block the cursor is positioned at. The 4-byte magic
    /// and block length are consumed without inspection; a garbage block
    /// fails on its record count or payloads.
    pub fn parse(cur: &mut ByteCursor, encoding_hint: Option<&str>) -> Result<Self> {
        cur.skip(4)?; // "EXTH"
        cur.skip(4)?; // block length
        let record_count = cur.read_u32_be()?;

        let mut meta = Self::default();
        for _ in 0..record_count {
            let record_type = cur.read_u32_be()?;
            let length = cur.read_u32_be()? as usize;
            if length < 8 {
                return Err(Error::Parse(format!(
                    "EXTH record of type {record_type} declares length {length}"
                )));
            }
            let payload = cur.read_bytes(length - 8)?;
            let text = || util::decode_text(payload, encoding_hint).into_owned();

            match record_type {
                100 => meta.author = Some(text()),
                101 => meta.publisher = Some(text()),
                103 => meta.description = Some(text()),
                104 => meta.isbn = Some(text()),
                106 => meta.publish_date = Some(util::parse_full_date(&text())?),
                524 => meta.language = Some(text()),
                201 => {
                    if payload.len() >= 4 {
                        let offset =
                            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                        if offset != NULL_INDEX {
                            meta.cover_offset = Some(offset);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exth_block(records: &[(u32, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"EXTH");
        let total: usize = 12 + records.iter().map(|(_, p)| 8 + p.len()).sum::<usize>();
        data.extend_from_slice(&(total as u32).to_be_bytes());
        data.extend_from_slice(&(records.len() as u32).to_be_bytes());
        for (rtype, payload) in records {
            data.extend_from_slice(&rtype.to_be_bytes());
            data.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
            data.extend_from_slice(payload);
        }
        data
    }

    #[test]
    fn exth_known_fields() {
        let block = exth_block(&[
            (100, b"Eric Weiner"),
            (101, b"Twelve"),
            (104, b"9780446511070"),
            (106, b"2008-01-10"),
            (524, b"en"),
            (999, b"ignored"),
        ]);
        let mut cur = ByteCursor::new(&block);
        let meta = ExthMeta::parse(&mut cur, None).unwrap();
        assert_eq!(meta.author.as_deref(), Some("Eric Weiner"));
        assert_eq!(meta.publisher.as_deref(), Some("Twelve"));
        assert_eq!(meta.isbn.as_deref(), Some("9780446511070"));
        assert_eq!(meta.language.as_deref(), Some("en"));
        let date = meta.publish_date.unwrap();
        assert_eq!(date.to_string(), "2008-01-10");
        assert!(meta.description.is_none());
    }

    #[test]
    fn exth_cover_offset() {
        let block = exth_block(&[(201, &42u32.to_be_bytes())]);
        let mut cur = ByteCursor::new(&block);
        let meta = ExthMeta::parse(&mut cur, None).unwrap();
        assert_eq!(meta.cover_offset, Some(42));

        let block = exth_block(&[(201, &NULL_INDEX.to_be_bytes())]);
        let mut cur = ByteCursor::new(&block);
        let meta = ExthMeta::parse(&mut cur, None).unwrap();
        assert_eq!(meta.cover_offset, None);
    }

    #[test]
    fn exth_truncated_record_fails() {
        let mut block = exth_block(&[]);
        block[11] = 3; // claim 3 records that are not there
        let mut cur = ByteCursor::new(&block);
        assert!(ExthMeta::parse(&mut cur, None).is_err());
    }

    #[test]
    fn exth_bad_date_fails() {
        let block = exth_block(&[(106, b"not a date")]);
        let mut cur = ByteCursor::new(&block);
        assert!(ExthMeta::parse(&mut cur, None).is_err());
    }

    #[test]
    fn palmdoc_header_fields() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&120_000u32.to_be_bytes());
        data.extend_from_slice(&30u16.to_be_bytes());
        data.extend_from_slice(&4096u16.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());

        let mut cur = ByteCursor::new(&data);
        let header = PalmDocHeader::parse(&mut cur).unwrap();
        assert_eq!(header.compression, COMPRESSION_PALMDOC);
        assert_eq!(header.text_length, 120_000);
        assert_eq!(header.record_count, 30);
        assert_eq!(header.record_size, 4096);
        assert_eq!(cur.tell(), 16);
    }

    #[test]
    fn mobi_header_fixed_offsets() {
        let mut data = vec![0u8; 232];
        data[0..4].copy_from_slice(b"MOBI");
        data[4..8].copy_from_slice(&232u32.to_be_bytes());
        data[8..12].copy_from_slice(&2u32.to_be_bytes());
        data[12..16].copy_from_slice(&65001u32.to_be_bytes());
        data[68..72].copy_from_slice(&0x300u32.to_be_bytes());
        data[72..76].copy_from_slice(&17u32.to_be_bytes());
        data[92..96].copy_from_slice(&5u32.to_be_bytes());
        data[226..228].copy_from_slice(&0b11u16.to_be_bytes());

        let mut cur = ByteCursor::new(&data);
        let header = MobiHeader::parse(&mut cur).unwrap();
        assert_eq!(header.header_length, 232);
        assert_eq!(header.text_encoding, 65001);
        assert_eq!(header.encoding_hint(), Some("utf-8"));
        assert_eq!(header.full_name_offset, 0x300);
        assert_eq!(header.full_name_length, 17);
        assert_eq!(header.first_image_index, 5);
        assert_eq!(header.extra_record_data_flags, 0b11);
        assert_eq!(cur.tell(), 232);
    }

    #[test]
    fn mobi_header_short_form_has_no_trailer_flags() {
        let mut data = vec![0u8; 116];
        data[0..4].copy_from_slice(b"MOBI");
        data[4..8].copy_from_slice(&116u32.to_be_bytes());

        let mut cur = ByteCursor::new(&data);
        let header = MobiHeader::parse(&mut cur).unwrap();
        assert_eq!(header.extra_record_data_flags, 0);
        assert_eq!(cur.tell(), 116);
    }

    #[test]
    fn mobi_header_bad_magic_fails() {
        let mut data = vec![0u8; 232];
        data[0..4].copy_from_slice(b"BOOK");
        let mut cur = ByteCursor::new(&data);
        assert!(MobiHeader::parse(&mut cur).is_err());
    }

    #[test]
    fn pdb_header_records() {
        let mut data = Vec::new();
        let mut name = [0u8; 32];
        name[..9].copy_from_slice(b"test-book");
        data.extend_from_slice(&name);
        data.extend_from_slice(&[0u8; 44]); // attributes through next-record-list id
        data.extend_from_slice(&2u16.to_be_bytes()); // record count
        for offset in [90u32, 120u32] {
            data.extend_from_slice(&offset.to_be_bytes());
            data.push(0);
            data.extend_from_slice(&[0, 0, 1]);
        }
        data.extend_from_slice(&[0, 0]); // padding

        let mut cur = ByteCursor::new(&data);
        let pdb = PdbHeader::parse(&mut cur).unwrap();
        assert_eq!(pdb.name, "test-book");
        assert_eq!(pdb.records.len(), 2);
        assert_eq!(pdb.records[0].data_offset, 90);
        assert_eq!(pdb.records[1].data_offset, 120);
    }

    #[test]
    fn pdb_header_decreasing_offsets_fail() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0u8; 76]);
        data.extend_from_slice(&2u16.to_be_bytes());
        for offset in [120u32, 90u32] {
            data.extend_from_slice(&offset.to_be_bytes());
            data.extend_from_slice(&[0, 0, 0, 1]);
        }
        data.extend_from_slice(&[0, 0]);

        let mut cur = ByteCursor::new(&data);
        assert!(PdbHeader::parse(&mut cur).is_err());
    }
}
