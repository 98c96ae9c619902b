//! Author-like tags in media containers.
//!
//! Handled containers: PNG text chunks, JPEG Exif (`XPAuthor`, then
//! `Artist`), ID3v2 (`TXXX:Author`, then `TPE1`) and RIFF `LIST/INFO`
//! (`IART`). Anything else is unsupported.

use std::io::{Read, Seek, SeekFrom};

use super::{be_u16, be_u32, clean_author, latin1, le_u16, le_u32, utf16};
use crate::error::StrategyError;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const MAX_CHUNK: u32 = 1024 * 1024;

const EXIF_ARTIST: u16 = 0x013B;
const EXIF_XP_AUTHOR: u16 = 0x9C9D;

pub(super) fn read_author<R: Read + Seek>(
    magic: &[u8; 8],
    reader: &mut R,
) -> Result<String, StrategyError> {
    let author = if *magic == PNG_SIGNATURE {
        png_author(reader)?
    } else if magic.starts_with(&[0xFF, 0xD8]) {
        jpeg_author(reader)?
    } else if magic.starts_with(b"ID3") {
        id3_author(reader)?
    } else if magic.starts_with(b"RIFF") {
        riff_author(reader)?
    } else {
        return Err(StrategyError::Unsupported);
    };
    author.ok_or(StrategyError::NoData)
}

fn read_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, StrategyError> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a fixed-size record, treating a clean end of file as `None`.
fn read_record<R: Read, const N: usize>(reader: &mut R) -> Result<Option<[u8; N]>, StrategyError> {
    let mut buf = [0u8; N];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn png_author<R: Read + Seek>(reader: &mut R) -> Result<Option<String>, StrategyError> {
    reader.seek(SeekFrom::Start(PNG_SIGNATURE.len() as u64))?;
    while let Some(head) = read_record::<_, 8>(reader)? {
        let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        let kind = &head[4..8];
        if kind == b"IDAT" || kind == b"IEND" {
            break;
        }
        if (kind == b"tEXt" || kind == b"iTXt") && len <= MAX_CHUNK {
            let data = read_vec(reader, len as usize)?;
            reader.seek(SeekFrom::Current(4))?;
            let text = if kind == b"tEXt" {
                png_text(&data)
            } else {
                png_itext(&data)
            };
            if let Some(author) = text.and_then(|t| clean_author(&t)) {
                return Ok(Some(author));
            }
        } else {
            reader.seek(SeekFrom::Current(i64::from(len) + 4))?;
        }
    }
    Ok(None)
}

fn split_keyword(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    Some((&data[..nul], &data[nul + 1..]))
}

fn png_text(data: &[u8]) -> Option<String> {
    let (keyword, text) = split_keyword(data)?;
    keyword
        .eq_ignore_ascii_case(b"Author")
        .then(|| latin1(text))
}

fn png_itext(data: &[u8]) -> Option<String> {
    let (keyword, rest) = split_keyword(data)?;
    if !keyword.eq_ignore_ascii_case(b"Author") {
        return None;
    }
    // Compressed iTXt is skipped.
    if *rest.first()? != 0 {
        return None;
    }
    let (_language, rest) = split_keyword(rest.get(2..)?)?;
    let (_translated, text) = split_keyword(rest)?;
    Some(String::from_utf8_lossy(text).into_owned())
}

fn jpeg_author<R: Read + Seek>(reader: &mut R) -> Result<Option<String>, StrategyError> {
    reader.seek(SeekFrom::Start(2))?;
    while let Some([marker_prefix, marker]) = read_record::<_, 2>(reader)? {
        if marker_prefix != 0xFF {
            return Err(StrategyError::format("jpeg", "lost segment sync"));
        }
        // Start of scan or end of image: no more metadata.
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            continue;
        }
        let Some(len) = read_record::<_, 2>(reader)? else {
            break;
        };
        let len = u16::from_be_bytes(len).saturating_sub(2);
        if marker == 0xE1 {
            let segment = read_vec(reader, len as usize)?;
            if let Some(tiff) = segment.strip_prefix(b"Exif\0\0") {
                return Ok(exif_author(tiff));
            }
        } else {
            reader.seek(SeekFrom::Current(i64::from(len)))?;
        }
    }
    Ok(None)
}

fn exif_author(tiff: &[u8]) -> Option<String> {
    let little = match tiff.get(..2)? {
        b"II" => true,
        b"MM" => false,
        _ => return None,
    };
    let u16_at = |offset| {
        if little {
            le_u16(tiff, offset)
        } else {
            be_u16(tiff, offset)
        }
    };
    let u32_at = |offset| {
        if little {
            le_u32(tiff, offset)
        } else {
            be_u32(tiff, offset)
        }
    };

    let ifd = u32_at(4)? as usize;
    let count = u16_at(ifd)? as usize;
    let mut artist = None;
    for i in 0..count {
        let entry = ifd + 2 + i * 12;
        let tag = u16_at(entry)?;
        if tag != EXIF_XP_AUTHOR && tag != EXIF_ARTIST {
            continue;
        }
        let len = u32_at(entry + 4)? as usize;
        let value = if len <= 4 {
            tiff.get(entry + 8..entry + 8 + len)?
        } else {
            let offset = u32_at(entry + 8)? as usize;
            tiff.get(offset..offset.checked_add(len)?)?
        };
        if tag == EXIF_XP_AUTHOR {
            // XP tags are UTF-16LE regardless of byte order.
            if let Some(author) = clean_author(&utf16(value, false)) {
                return Some(author);
            }
        } else {
            artist = clean_author(&latin1(value));
        }
    }
    artist
}

fn id3_author<R: Read + Seek>(reader: &mut R) -> Result<Option<String>, StrategyError> {
    reader.rewind()?;
    let header = read_vec(reader, 10)?;
    let version = header[3];
    if !(3..=4).contains(&version) {
        return Err(StrategyError::Unsupported);
    }
    let tag_len = synchsafe(&header[6..10]) as usize;
    if header[5] & 0x40 != 0 {
        return Err(StrategyError::format("id3", "extended header not supported"));
    }
    let tag = read_vec(reader, tag_len)?;

    let mut pos = 0;
    let mut performer = None;
    while pos + 10 <= tag.len() {
        let id = &tag[pos..pos + 4];
        if id[0] == 0 {
            break;
        }
        let size = match version {
            4 => synchsafe(&tag[pos + 4..pos + 8]),
            _ => be_u32(&tag, pos + 4).unwrap_or(0),
        };
        let size = size as usize;
        let body = tag
            .get(pos + 10..pos + 10 + size)
            .ok_or_else(|| StrategyError::format("id3", "frame overruns tag"))?;
        match id {
            b"TXXX" => {
                let author = id3_user_text(body)
                    .filter(|(description, _)| description.eq_ignore_ascii_case("author"))
                    .and_then(|(_, value)| clean_author(&value));
                if author.is_some() {
                    return Ok(author);
                }
            }
            b"TPE1" => {
                if performer.is_none() {
                    performer = body
                        .split_first()
                        .and_then(|(&encoding, text)| clean_author(&id3_text(encoding, text)));
                }
            }
            _ => {}
        }
        pos += 10 + size;
    }
    Ok(performer)
}

fn synchsafe(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

fn id3_text(encoding: u8, bytes: &[u8]) -> String {
    match encoding {
        0 => latin1(bytes),
        1 => match bytes {
            [0xFF, 0xFE, rest @ ..] => utf16(rest, false),
            [0xFE, 0xFF, rest @ ..] => utf16(rest, true),
            _ => utf16(bytes, false),
        },
        2 => utf16(bytes, true),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Split a `TXXX` body into description and value.
fn id3_user_text(body: &[u8]) -> Option<(String, String)> {
    let (&encoding, rest) = body.split_first()?;
    let wide = encoding == 1 || encoding == 2;
    let split = if wide {
        rest.chunks_exact(2)
            .position(|pair| pair == [0, 0])
            .map(|i| (i * 2, i * 2 + 2))
    } else {
        rest.iter().position(|&b| b == 0).map(|i| (i, i + 1))
    };
    let (end, value_start) = split?;
    Some((
        id3_text(encoding, &rest[..end]),
        id3_text(encoding, &rest[value_start..]),
    ))
}

fn riff_author<R: Read + Seek>(reader: &mut R) -> Result<Option<String>, StrategyError> {
    reader.seek(SeekFrom::Start(12))?;
    while let Some(head) = read_record::<_, 8>(reader)? {
        let len = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
        let padded = i64::from(len) + i64::from(len & 1);
        if &head[..4] != b"LIST" || len > MAX_CHUNK {
            reader.seek(SeekFrom::Current(padded))?;
            continue;
        }
        let list = read_vec(reader, len as usize)?;
        if len & 1 == 1 {
            reader.seek(SeekFrom::Current(1))?;
        }
        if list.get(..4) != Some(b"INFO".as_slice()) {
            continue;
        }
        let mut pos = 4;
        while pos + 8 <= list.len() {
            let size = le_u32(&list, pos + 4).unwrap_or(0) as usize;
            let Some(value) = list.get(pos + 8..pos + 8 + size) else {
                break;
            };
            if &list[pos..pos + 4] == b"IART" {
                let text = match std::str::from_utf8(value) {
                    Ok(text) => text.to_string(),
                    Err(_) => latin1(value),
                };
                return Ok(clean_author(&text));
            }
            pos += 8 + size + (size & 1);
        }
    }
    Ok(None)
}
