//! Built-in author readers.

mod media;
mod ole;
mod ooxml;
mod pdf;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::error::StrategyError;
use crate::strategy::AuthorStrategy;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Office documents: OOXML packages and legacy compound files.
///
/// The container is picked by magic bytes, not by extension, so a
/// misnamed `.doc` that is really OOXML still resolves.
#[derive(Debug, Clone, Copy)]
pub struct OfficeStrategy {
    label: &'static str,
}

impl OfficeStrategy {
    /// Create a reader whose log name is `label`.
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl AuthorStrategy for OfficeStrategy {
    fn name(&self) -> &'static str {
        self.label
    }

    fn read_author(&self, path: &Path) -> Result<String, StrategyError> {
        let mut file = File::open(path)?;
        let magic = read_magic(&mut file)?;
        let reader = BufReader::new(file);
        if magic.starts_with(ZIP_MAGIC) {
            ooxml::read_creator(reader)
        } else if magic == ole::SIGNATURE {
            ole::read_author(reader)
        } else {
            Err(StrategyError::Unsupported)
        }
    }
}

/// `/Author` from a PDF info dictionary, or the XMP creator.
#[derive(Debug, Clone, Copy)]
pub struct PdfInfoStrategy;

impl AuthorStrategy for PdfInfoStrategy {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn read_author(&self, path: &Path) -> Result<String, StrategyError> {
        let mut file = File::open(path)?;
        pdf::read_author(&mut file)
    }
}

/// Author-like tags embedded in images, audio and video.
#[derive(Debug, Clone, Copy)]
pub struct MediaTagStrategy;

impl AuthorStrategy for MediaTagStrategy {
    fn name(&self) -> &'static str {
        "media"
    }

    fn read_author(&self, path: &Path) -> Result<String, StrategyError> {
        let mut file = File::open(path)?;
        let magic = read_magic(&mut file)?;
        let mut reader = BufReader::new(file);
        media::read_author(&magic, &mut reader)
    }
}

/// Read up to eight leading bytes and rewind.
fn read_magic<R: Read + Seek>(reader: &mut R) -> Result<[u8; 8], StrategyError> {
    let mut magic = [0u8; 8];
    let mut filled = 0;
    while filled < magic.len() {
        let n = reader.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.rewind()?;
    Ok(magic)
}

/// Trim NULs and whitespace; empty strings mean no author.
fn clean_author(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn utf16(bytes: &[u8], big_endian: bool) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

fn le_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn le_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
