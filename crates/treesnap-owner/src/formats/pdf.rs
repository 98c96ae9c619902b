//! `/Author` of a PDF document.
//!
//! The info dictionary normally sits near the end of the file (classic
//! trailer) or near the start (linearized files), so only the head and the
//! tail are scanned. Compressed object streams are not inflated; the XMP
//! `dc:creator` packet is used as a fallback when it is stored plainly.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::LazyLock;

use regex::bytes::Regex;

use super::{clean_author, latin1, utf16};
use crate::error::StrategyError;

const WINDOW: u64 = 4 * 1024 * 1024;

static XMP_CREATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<dc:creator>.*?<rdf:li[^>]*>([^<]*)</rdf:li>").expect("valid xmp pattern")
});

pub(super) fn read_author(file: &mut File) -> Result<String, StrategyError> {
    let len = file.metadata()?.len();
    let mut header = [0u8; 5];
    file.read_exact(&mut header)
        .map_err(|_| StrategyError::format("pdf", "file too short"))?;
    if &header != b"%PDF-" {
        return Err(StrategyError::format("pdf", "missing %PDF header"));
    }

    let tail = read_window(file, len.saturating_sub(WINDOW), WINDOW)?;
    if let Some(author) = find_author(&tail) {
        return Ok(author);
    }
    if len > WINDOW {
        let head = read_window(file, 0, WINDOW)?;
        if let Some(author) = find_author(&head) {
            return Ok(author);
        }
    }
    Err(StrategyError::NoData)
}

fn read_window(file: &mut File, start: u64, len: u64) -> Result<Vec<u8>, StrategyError> {
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::new();
    file.take(len).read_to_end(&mut buf)?;
    Ok(buf)
}

fn find_author(data: &[u8]) -> Option<String> {
    info_author(data).or_else(|| xmp_author(data))
}

/// Last `/Author` entry wins; incremental updates append newer ones.
fn info_author(data: &[u8]) -> Option<String> {
    const KEY: &[u8] = b"/Author";
    let mut found = None;
    let mut from = 0;
    while let Some(pos) = find(&data[from..], KEY) {
        let value_start = from + pos + KEY.len();
        from = value_start;
        // `/AuthorFoo` is a different key.
        if data
            .get(value_start)
            .is_some_and(|b| b.is_ascii_alphanumeric())
        {
            continue;
        }
        if let Some(text) = parse_string(&data[value_start..]) {
            found = clean_author(&text).or(found);
        }
    }
    found
}

fn xmp_author(data: &[u8]) -> Option<String> {
    let captures = XMP_CREATOR.captures(data)?;
    let raw = String::from_utf8_lossy(captures.get(1)?.as_bytes()).into_owned();
    clean_author(&raw)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse a literal `( ... )` or hex `< ... >` string after optional whitespace.
fn parse_string(data: &[u8]) -> Option<String> {
    let start = data.iter().position(|b| !b.is_ascii_whitespace())?;
    let bytes = match data[start] {
        b'(' => literal_string(&data[start + 1..])?,
        b'<' if data.get(start + 1) != Some(&b'<') => hex_string(&data[start + 1..])?,
        _ => return None,
    };
    Some(decode_text(&bytes))
}

fn literal_string(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        match b {
            b'\\' => {
                i += 1;
                let escaped = *data.get(i)?;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    b'\r' | b'\n' => {}
                    b'0'..=b'7' => {
                        let mut value = u32::from(escaped - b'0');
                        for _ in 0..2 {
                            match data.get(i + 1) {
                                Some(d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    i += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(value as u8);
                    }
                    other => out.push(other),
                }
            }
            b'(' => {
                depth += 1;
                out.push(b);
            }
            b')' => {
                if depth == 0 {
                    return Some(out);
                }
                depth -= 1;
                out.push(b);
            }
            _ => out.push(b),
        }
        i += 1;
    }
    None
}

fn hex_string(data: &[u8]) -> Option<Vec<u8>> {
    let end = data.iter().position(|&b| b == b'>')?;
    let digits: Vec<u8> = data[..end]
        .iter()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|&b| (b as char).to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()?;
    Some(
        digits
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
            .collect(),
    )
}

/// PDF text strings are UTF-16BE with a BOM or PDFDocEncoding.
fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => utf16(rest, true),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => latin1(bytes),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pdf_file(body: &[u8]) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"%PDF-1.4\n").unwrap();
        file.write_all(body).unwrap();
        file.rewind().unwrap();
        file
    }

    #[test]
    fn test_literal_author() {
        let mut file = pdf_file(b"1 0 obj << /Title (Q3) /Author (Jane \\(JD\\) Doe) >> endobj\ntrailer");
        assert_eq!(read_author(&mut file).unwrap(), "Jane (JD) Doe");
    }

    #[test]
    fn test_hex_utf16_author() {
        let mut file = pdf_file(b"<< /Author <FEFF004A006F00EB> >>");
        assert_eq!(read_author(&mut file).unwrap(), "Jo\u{eb}");
    }

    #[test]
    fn test_latest_update_wins() {
        let mut file = pdf_file(b"<< /Author (Old) >>\n%%EOF\n<< /Author (New) >>\n%%EOF");
        assert_eq!(read_author(&mut file).unwrap(), "New");
    }

    #[test]
    fn test_xmp_fallback() {
        let mut file = pdf_file(
            b"<x:xmpmeta><dc:creator><rdf:Seq><rdf:li>Ken Adams</rdf:li></rdf:Seq></dc:creator></x:xmpmeta>",
        );
        assert_eq!(read_author(&mut file).unwrap(), "Ken Adams");
    }

    #[test]
    fn test_no_author() {
        let mut file = pdf_file(b"<< /Title (Nothing) /AuthorLess (x) /Author () >>");
        assert!(matches!(read_author(&mut file), Err(StrategyError::NoData)));
    }

    #[test]
    fn test_not_a_pdf() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"GIF89a....").unwrap();
        file.rewind().unwrap();
        assert!(matches!(
            read_author(&mut file),
            Err(StrategyError::Format { .. })
        ));
    }

    #[test]
    fn test_octal_escape() {
        assert_eq!(
            literal_string(b"Ren\\351e) trailing").map(|b| decode_text(&b)),
            Some("Ren\u{e9}e".to_string())
        );
    }
}
