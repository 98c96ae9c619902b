//! Listing of compressed-file contents.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

use thiserror::Error;
use treesnap_core::{Children, Node};

/// Failure to list an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Neither the name nor the leading bytes match a supported container.
    #[error("unrecognized archive format")]
    Unrecognized,
}

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarXz,
    TarBz2,
}

impl ArchiveKind {
    /// Detect the container from a file name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let kinds = [
            (".zip", Self::Zip),
            (".tar.gz", Self::TarGz),
            (".tgz", Self::TarGz),
            (".tar.xz", Self::TarXz),
            (".txz", Self::TarXz),
            (".tar.bz2", Self::TarBz2),
            (".tbz2", Self::TarBz2),
            (".tar", Self::Tar),
        ];
        kinds
            .into_iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(_, kind)| kind)
    }

    /// Detect the container from its leading bytes.
    ///
    /// Compressed streams are assumed to wrap a tar archive.
    pub fn from_magic(head: &[u8]) -> Option<Self> {
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            Some(Self::Zip)
        } else if head.starts_with(&[0x1F, 0x8B]) {
            Some(Self::TarGz)
        } else if head.starts_with(&[0xFD, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Self::TarXz)
        } else if head.starts_with(b"BZh") {
            Some(Self::TarBz2)
        } else if head.get(257..262) == Some(b"ustar".as_slice()) {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Lists the entries of compressed files as lightweight archive-entry nodes.
///
/// Entries carry only their uncompressed size; nothing inside an archive is
/// opened, resolved or expanded further. Directory entries are skipped and
/// keys are the in-archive paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveInspector;

impl ArchiveInspector {
    pub fn new() -> Self {
        Self
    }

    /// List the archive at `path`. Blocking.
    pub fn inspect(&self, path: &Path) -> Result<Children, ArchiveError> {
        let mut file = File::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        let kind = match ArchiveKind::from_name(&name) {
            Some(kind) => kind,
            None => {
                let mut head = Vec::with_capacity(512);
                (&mut file).take(512).read_to_end(&mut head)?;
                file.rewind()?;
                ArchiveKind::from_magic(&head).ok_or(ArchiveError::Unrecognized)?
            }
        };
        let reader = BufReader::new(file);

        match kind {
            ArchiveKind::Zip => list_zip(reader),
            #[cfg(feature = "tar")]
            ArchiveKind::Tar => list_tar(reader),
            #[cfg(feature = "tar")]
            ArchiveKind::TarGz => list_tar(flate2::read::GzDecoder::new(reader)),
            #[cfg(feature = "tar")]
            ArchiveKind::TarXz => list_tar(xz2::read::XzDecoder::new(reader)),
            #[cfg(feature = "tar")]
            ArchiveKind::TarBz2 => list_tar(bzip2::read::BzDecoder::new(reader)),
            #[cfg(not(feature = "tar"))]
            _ => Err(ArchiveError::Unrecognized),
        }
    }
}

fn list_zip<R: Read + Seek>(reader: R) -> Result<Children, ArchiveError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut children = Children::new();
    for index in 0..archive.len() {
        // Raw access reads the header without decompressing the entry.
        let entry = archive.by_index_raw(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().trim_end_matches('/');
        if name.is_empty() {
            continue;
        }
        children.insert(name.into(), Node::new_archive_entry(entry.size()));
    }
    Ok(children)
}

#[cfg(feature = "tar")]
fn list_tar<R: Read>(reader: R) -> Result<Children, ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    let mut children = Children::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let header = entry.header();
        if header.entry_type().is_dir() {
            continue;
        }
        let size = header.size()?;
        let path = entry.path()?;
        let name = path.to_string_lossy();
        let name = name.trim_start_matches("./").trim_end_matches('/');
        if name.is_empty() {
            continue;
        }
        children.insert(name.into(), Node::new_archive_entry(size));
    }
    Ok(children)
}
