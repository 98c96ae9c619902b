//! Author of a legacy compound document (`.doc`, `.xls`, `.ppt`).
//!
//! Only as much of the compound file format is implemented as is needed to
//! pull the `SummaryInformation` property set out of the container: header,
//! FAT (with DIFAT extension), directory, mini FAT and mini stream.

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};

use super::{clean_author, latin1, le_u16, le_u32, utf16};
use crate::error::StrategyError;

pub(super) const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const HEADER_LEN: usize = 512;
const HEADER_DIFAT_ENTRIES: usize = 109;
const DIR_ENTRY_LEN: usize = 128;
const MAX_REGULAR_SECTOR: u32 = 0xFFFF_FFFA;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const MAX_STREAM_LEN: u64 = 64 * 1024 * 1024;

const OBJECT_STREAM: u8 = 2;
const OBJECT_ROOT: u8 = 5;

const SUMMARY_INFORMATION: &str = "\u{5}SummaryInformation";
const PID_AUTHOR: u32 = 4;
const VT_LPSTR: u32 = 0x1E;
const VT_LPWSTR: u32 = 0x1F;

pub(super) fn read_author<R: Read + Seek>(reader: R) -> Result<String, StrategyError> {
    let mut file = CompoundFile::open(reader)?;
    let entry = file
        .entries
        .iter()
        .find(|e| e.kind == OBJECT_STREAM && e.name == SUMMARY_INFORMATION)
        .cloned()
        .ok_or(StrategyError::NoData)?;
    let stream = file.read_stream(&entry)?;
    summary_author(&stream)?.ok_or(StrategyError::NoData)
}

fn malformed(message: &str) -> StrategyError {
    StrategyError::format("compound file", message)
}

#[derive(Debug, Clone)]
struct DirEntry {
    name: String,
    kind: u8,
    start: u32,
    size: u64,
}

struct CompoundFile<R> {
    reader: R,
    sector_size: usize,
    mini_sector_size: usize,
    mini_cutoff: u64,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    entries: Vec<DirEntry>,
}

impl<R: Read + Seek> CompoundFile<R> {
    fn open(mut reader: R) -> Result<Self, StrategyError> {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header)?;
        if header[..8] != SIGNATURE {
            return Err(malformed("missing signature"));
        }

        let field = |offset| le_u32(&header, offset).ok_or_else(|| malformed("short header"));
        let sector_shift = le_u16(&header, 0x1E).ok_or_else(|| malformed("short header"))?;
        let mini_shift = le_u16(&header, 0x20).ok_or_else(|| malformed("short header"))?;
        if sector_shift != 9 && sector_shift != 12 {
            return Err(malformed("unsupported sector size"));
        }
        if mini_shift >= sector_shift {
            return Err(malformed("bad mini sector size"));
        }
        let fat_sectors = field(0x2C)? as usize;
        let first_dir = field(0x30)?;
        let mini_cutoff = u64::from(field(0x38)?);
        let first_mini_fat = field(0x3C)?;
        let first_difat = field(0x44)?;
        let difat_sectors = field(0x48)? as usize;

        let mut file = Self {
            reader,
            sector_size: 1 << sector_shift,
            mini_sector_size: 1 << mini_shift,
            mini_cutoff,
            fat: Vec::new(),
            mini_fat: Vec::new(),
            entries: Vec::new(),
        };

        let mut fat_locations: Vec<u32> = (0..HEADER_DIFAT_ENTRIES)
            .filter_map(|i| le_u32(&header, 0x4C + i * 4))
            .filter(|&s| s <= MAX_REGULAR_SECTOR)
            .collect();
        // The header's DIFAT count is untrusted; a chain can visit each
        // sector of the file at most once.
        let sector_count = file.sector_count()?;
        let mut visited = HashSet::new();
        let mut next = first_difat;
        for _ in 0..difat_sectors.min(sector_count) {
            if next > MAX_REGULAR_SECTOR || fat_locations.len() >= fat_sectors {
                break;
            }
            if !visited.insert(next) {
                return Err(malformed("broken DIFAT chain"));
            }
            let sector = file.read_sector(next)?;
            let per_sector = file.sector_size / 4 - 1;
            fat_locations.extend(
                (0..per_sector)
                    .filter_map(|i| le_u32(&sector, i * 4))
                    .filter(|&s| s <= MAX_REGULAR_SECTOR),
            );
            next = le_u32(&sector, per_sector * 4).unwrap_or(END_OF_CHAIN);
        }
        fat_locations.truncate(fat_sectors);

        let mut fat = Vec::with_capacity(fat_locations.len() * file.sector_size / 4);
        for location in fat_locations {
            let sector = file.read_sector(location)?;
            fat.extend(sector.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])));
        }
        file.fat = fat;

        if first_mini_fat <= MAX_REGULAR_SECTOR {
            let bytes = file.read_chain(first_mini_fat, u64::MAX)?;
            file.mini_fat = bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
        }

        let directory = file.read_chain(first_dir, u64::MAX)?;
        let large_sizes = file.sector_size > 512;
        file.entries = directory
            .chunks_exact(DIR_ENTRY_LEN)
            .filter_map(|raw| parse_dir_entry(raw, large_sizes))
            .collect();
        Ok(file)
    }

    /// Number of whole sectors after the header.
    fn sector_count(&mut self) -> Result<usize, StrategyError> {
        let len = self.reader.seek(SeekFrom::End(0))?;
        Ok((len.saturating_sub(HEADER_LEN as u64) / self.sector_size as u64) as usize)
    }

    fn read_sector(&mut self, id: u32) -> Result<Vec<u8>, StrategyError> {
        let offset = (u64::from(id) + 1) * self.sector_size as u64;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.sector_size];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn chain(table: &[u32], start: u32) -> Result<Vec<u32>, StrategyError> {
        let mut sectors = Vec::new();
        let mut current = start;
        while current != END_OF_CHAIN {
            if current > MAX_REGULAR_SECTOR || sectors.len() > table.len() {
                return Err(malformed("broken sector chain"));
            }
            sectors.push(current);
            current = *table
                .get(current as usize)
                .ok_or_else(|| malformed("sector outside allocation table"))?;
        }
        Ok(sectors)
    }

    fn read_chain(&mut self, start: u32, limit: u64) -> Result<Vec<u8>, StrategyError> {
        let sectors = Self::chain(&self.fat, start)?;
        let total = (sectors.len() * self.sector_size) as u64;
        if total > MAX_STREAM_LEN {
            return Err(malformed("stream too large"));
        }
        let mut data = Vec::with_capacity(total as usize);
        for sector in sectors {
            data.extend(self.read_sector(sector)?);
        }
        if limit < data.len() as u64 {
            data.truncate(limit as usize);
        }
        Ok(data)
    }

    fn read_stream(&mut self, entry: &DirEntry) -> Result<Vec<u8>, StrategyError> {
        if entry.size >= self.mini_cutoff {
            return self.read_chain(entry.start, entry.size);
        }

        let root = self
            .entries
            .iter()
            .find(|e| e.kind == OBJECT_ROOT)
            .cloned()
            .ok_or_else(|| malformed("missing root entry"))?;
        let mini_stream = self.read_chain(root.start, root.size)?;
        let mut data = Vec::new();
        for mini in Self::chain(&self.mini_fat, entry.start)? {
            let begin = mini as usize * self.mini_sector_size;
            let chunk = mini_stream
                .get(begin..begin + self.mini_sector_size)
                .ok_or_else(|| malformed("mini sector outside mini stream"))?;
            data.extend_from_slice(chunk);
        }
        data.truncate(entry.size as usize);
        Ok(data)
    }
}

fn parse_dir_entry(raw: &[u8], large_sizes: bool) -> Option<DirEntry> {
    let kind = *raw.get(0x42)?;
    if kind == 0 {
        return None;
    }
    let name_len = (le_u16(raw, 0x40)? as usize).min(64);
    let name = utf16(raw.get(..name_len.saturating_sub(2))?, false);
    let start = le_u32(raw, 0x74)?;
    let low = u64::from(le_u32(raw, 0x78)?);
    let high = u64::from(le_u32(raw, 0x7C)?);
    let size = if large_sizes { low | (high << 32) } else { low };
    Some(DirEntry {
        name,
        kind,
        start,
        size,
    })
}

/// Extract `PID_AUTHOR` from a `SummaryInformation` property set stream.
fn summary_author(stream: &[u8]) -> Result<Option<String>, StrategyError> {
    if le_u16(stream, 0) != Some(0xFFFE) {
        return Err(malformed("bad property set byte order"));
    }
    let section = le_u32(stream, 44).ok_or_else(|| malformed("short property set"))? as usize;
    let count = le_u32(stream, section + 4).ok_or_else(|| malformed("short section"))? as usize;

    for i in 0..count.min(1024) {
        let pair = section + 8 + i * 8;
        let (Some(pid), Some(offset)) = (le_u32(stream, pair), le_u32(stream, pair + 4)) else {
            break;
        };
        if pid != PID_AUTHOR {
            continue;
        }
        let value = section + offset as usize;
        let vtype = le_u32(stream, value).ok_or_else(|| malformed("short property"))? & 0xFFFF;
        let len = le_u32(stream, value + 4).ok_or_else(|| malformed("short property"))? as usize;
        let text = match vtype {
            VT_LPSTR => {
                let bytes = stream
                    .get(value + 8..value + 8 + len)
                    .ok_or_else(|| malformed("truncated string"))?;
                match std::str::from_utf8(bytes) {
                    Ok(text) => text.to_string(),
                    Err(_) => latin1(bytes),
                }
            }
            VT_LPWSTR => {
                let bytes = stream
                    .get(value + 8..value + 8 + len * 2)
                    .ok_or_else(|| malformed("truncated string"))?;
                utf16(bytes, false)
            }
            _ => return Ok(None),
        };
        return Ok(clean_author(&text));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FREE_SECTOR: u32 = 0xFFFF_FFFF;

    fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
        buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn summary_stream(author: &str) -> Vec<u8> {
        let mut stream = vec![0u8; 48];
        put_u16(&mut stream, 0, 0xFFFE);
        put_u32(&mut stream, 24, 1);
        put_u32(&mut stream, 44, 48);

        let mut value = Vec::new();
        value.extend_from_slice(&VT_LPSTR.to_le_bytes());
        value.extend_from_slice(&((author.len() + 1) as u32).to_le_bytes());
        value.extend_from_slice(author.as_bytes());
        value.push(0);
        while value.len() % 4 != 0 {
            value.push(0);
        }

        let mut section = Vec::new();
        section.extend_from_slice(&((16 + value.len()) as u32).to_le_bytes());
        section.extend_from_slice(&1u32.to_le_bytes());
        section.extend_from_slice(&PID_AUTHOR.to_le_bytes());
        section.extend_from_slice(&16u32.to_le_bytes());
        section.extend_from_slice(&value);

        stream.extend_from_slice(&section);
        stream
    }

    fn dir_entry(name: &str, kind: u8, start: u32, size: u32) -> Vec<u8> {
        let mut raw = vec![0u8; DIR_ENTRY_LEN];
        let units: Vec<u16> = name.encode_utf16().collect();
        for (i, unit) in units.iter().enumerate() {
            put_u16(&mut raw, i * 2, *unit);
        }
        put_u16(&mut raw, 0x40, ((units.len() + 1) * 2) as u16);
        raw[0x42] = kind;
        put_u32(&mut raw, 0x74, start);
        put_u32(&mut raw, 0x78, size);
        raw
    }

    /// Sector 0: FAT, 1: directory, 2: mini FAT, 3: mini stream.
    fn compound_file(author: &str) -> Vec<u8> {
        let summary = summary_stream(author);
        assert!(summary.len() <= 128);

        let mut header = vec![0u8; HEADER_LEN];
        header[..8].copy_from_slice(&SIGNATURE);
        put_u16(&mut header, 0x1A, 3);
        put_u16(&mut header, 0x1C, 0xFFFE);
        put_u16(&mut header, 0x1E, 9);
        put_u16(&mut header, 0x20, 6);
        put_u32(&mut header, 0x2C, 1);
        put_u32(&mut header, 0x30, 1);
        put_u32(&mut header, 0x38, 4096);
        put_u32(&mut header, 0x3C, 2);
        put_u32(&mut header, 0x40, 1);
        put_u32(&mut header, 0x44, END_OF_CHAIN);
        for i in 0..HEADER_DIFAT_ENTRIES {
            put_u32(&mut header, 0x4C + i * 4, FREE_SECTOR);
        }
        put_u32(&mut header, 0x4C, 0);

        let mut fat = vec![0u8; 512];
        for i in 0..128 {
            put_u32(&mut fat, i * 4, FREE_SECTOR);
        }
        put_u32(&mut fat, 0, 0xFFFF_FFFD);
        put_u32(&mut fat, 4, END_OF_CHAIN);
        put_u32(&mut fat, 8, END_OF_CHAIN);
        put_u32(&mut fat, 12, END_OF_CHAIN);

        let mut directory = Vec::new();
        directory.extend(dir_entry("Root Entry", OBJECT_ROOT, 3, 128));
        directory.extend(dir_entry(SUMMARY_INFORMATION, OBJECT_STREAM, 0, summary.len() as u32));
        directory.resize(512, 0);

        let mut mini_fat = vec![0u8; 512];
        for i in 0..128 {
            put_u32(&mut mini_fat, i * 4, FREE_SECTOR);
        }
        put_u32(&mut mini_fat, 0, 1);
        put_u32(&mut mini_fat, 4, END_OF_CHAIN);

        let mut mini_stream = summary;
        mini_stream.resize(512, 0);

        [header, fat, directory, mini_fat, mini_stream].concat()
    }

    #[test]
    fn test_reads_summary_author() {
        let file = compound_file("Dana Scully");
        assert_eq!(read_author(Cursor::new(file)).unwrap(), "Dana Scully");
    }

    #[test]
    fn test_missing_summary_stream() {
        let mut file = compound_file("Fox Mulder");
        // Blank out the second directory entry.
        let dir_start = 2 * 512 + DIR_ENTRY_LEN;
        file[dir_start..dir_start + DIR_ENTRY_LEN].fill(0);
        assert!(matches!(
            read_author(Cursor::new(file)),
            Err(StrategyError::NoData)
        ));
    }

    #[test]
    fn test_rejects_bad_signature() {
        let mut file = compound_file("Walter Skinner");
        file[0] = 0;
        assert!(matches!(
            read_author(Cursor::new(file)),
            Err(StrategyError::Format { .. })
        ));
    }

    fn looping_difat_sector(id: u32) -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        for i in 0..127 {
            put_u32(&mut sector, i * 4, FREE_SECTOR);
        }
        put_u32(&mut sector, 508, id);
        sector
    }

    #[test]
    fn test_difat_cycle_is_rejected() {
        let mut file = compound_file("Alex Krycek");
        put_u32(&mut file, 0x2C, 1000);
        put_u32(&mut file, 0x44, 4);
        put_u32(&mut file, 0x48, u32::MAX);
        file.extend(looping_difat_sector(4));

        match read_author(Cursor::new(file)) {
            Err(StrategyError::Format { message, .. }) => assert!(message.contains("DIFAT")),
            other => panic!("expected a format error, got {other:?}"),
        }
    }

    #[test]
    fn test_difat_stops_once_fat_is_located() {
        let mut file = compound_file("Monica Reyes");
        put_u32(&mut file, 0x44, 4);
        put_u32(&mut file, 0x48, u32::MAX);
        file.extend(looping_difat_sector(4));

        assert_eq!(read_author(Cursor::new(file)).unwrap(), "Monica Reyes");
    }

    #[test]
    fn test_summary_wide_string() {
        let mut stream = summary_stream("x");
        let value = 48 + 16;
        let wide: Vec<u8> = "Ren\u{e9}e".encode_utf16().flat_map(u16::to_le_bytes).collect();
        stream.truncate(value);
        stream.extend_from_slice(&VT_LPWSTR.to_le_bytes());
        stream.extend_from_slice(&5u32.to_le_bytes());
        stream.extend_from_slice(&wide);
        assert_eq!(summary_author(&stream).unwrap().as_deref(), Some("Ren\u{e9}e"));
    }
}
