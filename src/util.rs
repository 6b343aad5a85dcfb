//! Shared text-decoding, date, and image-sniffing helpers.

use std::borrow::Cow;

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Decode bytes to a string, handling the encodings ebooks actually use.
///
/// Tries UTF-8 first (BOM handled by encoding_rs), then the hint encoding
/// (from an XML declaration or a container header), then falls back to
/// Windows-1252.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);
    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Strip a UTF-8 BOM if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Extract the encoding name from an `<?xml ... encoding="..." ?>`
/// declaration. Only the first ~100 bytes are checked.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// Truncate an ISO date/timestamp to just the date portion (`YYYY-MM-DD`).
pub fn truncate_to_date(s: &str) -> &str {
    match s.find('T') {
        Some(t_pos) => &s[..t_pos],
        None => s,
    }
}

/// Parse a full-length publish date. The timestamp tail, if any, is
/// dropped first; anything that is not `YYYY-MM-DD` after that is a
/// hard parse error.
pub fn parse_full_date(s: &str) -> Result<NaiveDate> {
    let date = truncate_to_date(s.trim());
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| Error::Parse(format!("unparseable publish date {date:?}: {e}")))
}

/// Sniff an image MIME type from magic bytes.
///
/// Recognizes JPEG, PNG, GIF, and SVG; anything else is `None`. No actual
/// image decoding happens here.
pub fn detect_image_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8]) {
        return Some("image/jpeg");
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    if data.starts_with(b"GIF") {
        return Some("image/gif");
    }
    if is_svg(data) {
        return Some("image/svg+xml");
    }
    None
}

fn is_svg(data: &[u8]) -> bool {
    let text = String::from_utf8_lossy(&data[..data.len().min(255)]);
    let head = text.trim_start().to_ascii_lowercase();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}
