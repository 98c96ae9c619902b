//! Snapshot node types.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Children of a node, keyed by entry name.
pub type Children = BTreeMap<CompactString, Node>;

/// Owner label used when no strategy produced a value.
pub const UNKNOWN_OWNER: &str = "Unknown";

/// Owner label used when the retry budget ran out on transient errors.
pub const TRANSIENT_OWNER: &str = "Unknown due to network disturbances";

/// Owner label used when resolution failed outside the classified paths.
pub const UNRETRIEVABLE_OWNER: &str = "Unable to retrieve owner";

/// File metadata timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Creation time (platform-dependent).
    pub created: Option<SystemTime>,
    /// Last access time.
    pub accessed: Option<SystemTime>,
    /// Last modification time.
    pub modified: Option<SystemTime>,
}

impl Timestamps {
    /// Create timestamps from explicit values.
    pub fn new(
        created: Option<SystemTime>,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            created,
            accessed,
            modified,
        }
    }

    /// Read all available timestamps from filesystem metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            created: metadata.created().ok(),
            accessed: metadata.accessed().ok(),
            modified: metadata.modified().ok(),
        }
    }
}

/// Type of snapshot node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Directory on disk.
    Directory,
    /// Regular file.
    File,
    /// File whose extension denotes an archive container.
    CompressedFile,
    /// Item listed inside a compressed file.
    ArchiveEntry,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a file on disk (plain or compressed).
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File | NodeKind::CompressedFile)
    }

    /// Check if this is a compressed file.
    pub fn is_compressed(&self) -> bool {
        matches!(self, NodeKind::CompressedFile)
    }

    /// Check if this is an entry inside an archive.
    pub fn is_archive_entry(&self) -> bool {
        matches!(self, NodeKind::ArchiveEntry)
    }

    /// Label written to the `type` field of a snapshot report.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Directory => "folder",
            NodeKind::File => "file",
            NodeKind::CompressedFile => "compressed file",
            NodeKind::ArchiveEntry => "file in compressed file",
        }
    }

    /// Parse a report label back into a kind.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "folder" => Some(NodeKind::Directory),
            "file" => Some(NodeKind::File),
            "compressed file" => Some(NodeKind::CompressedFile),
            "file in compressed file" => Some(NodeKind::ArchiveEntry),
            _ => None,
        }
    }
}

/// Outcome of owner resolution for one entry.
///
/// The degraded variants are kept apart so that callers can re-run only the
/// entries that failed because of transient I/O.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// An owner or author string was found.
    Resolved(String),
    /// No strategy produced a value.
    Unknown,
    /// The retry budget was exhausted on transient failures.
    TransientFailure,
    /// Resolution failed in an unexpected way.
    Unretrievable,
}

impl Owner {
    /// The string written to snapshot reports.
    pub fn as_str(&self) -> &str {
        match self {
            Owner::Resolved(name) => name,
            Owner::Unknown => UNKNOWN_OWNER,
            Owner::TransientFailure => TRANSIENT_OWNER,
            Owner::Unretrievable => UNRETRIEVABLE_OWNER,
        }
    }

    /// Parse a report string back into an owner.
    pub fn from_label(label: &str) -> Self {
        match label {
            UNKNOWN_OWNER => Owner::Unknown,
            TRANSIENT_OWNER => Owner::TransientFailure,
            UNRETRIEVABLE_OWNER => Owner::Unretrievable,
            name => Owner::Resolved(name.to_string()),
        }
    }

    /// Check if the value is one of the degraded sentinels.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Owner::Resolved(_))
    }

    /// Check if the value degraded because of transient I/O.
    pub fn is_transient(&self) -> bool {
        matches!(self, Owner::TransientFailure)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node type.
    pub kind: NodeKind,

    /// Absolute path of the containing directory (absent for archive entries).
    pub parent: Option<PathBuf>,

    /// Size in bytes (recursive sum for directories).
    pub size: u64,

    /// Resolved owner (absent for archive entries).
    pub owner: Option<Owner>,

    /// Timestamps (absent for archive entries).
    pub timestamps: Option<Timestamps>,

    /// Children keyed by name.
    pub children: Children,
}

impl Node {
    /// Create a directory node with no children and zero size.
    pub fn new_directory(parent: Option<PathBuf>, timestamps: Option<Timestamps>) -> Self {
        Self {
            kind: NodeKind::Directory,
            parent,
            size: 0,
            owner: None,
            timestamps,
            children: Children::new(),
        }
    }

    /// Create a file node.
    pub fn new_file(
        parent: impl Into<PathBuf>,
        size: u64,
        timestamps: Timestamps,
        compressed: bool,
    ) -> Self {
        Self {
            kind: if compressed {
                NodeKind::CompressedFile
            } else {
                NodeKind::File
            },
            parent: Some(parent.into()),
            size,
            owner: None,
            timestamps: Some(timestamps),
            children: Children::new(),
        }
    }

    /// Create an archive entry node carrying only its uncompressed size.
    pub fn new_archive_entry(size: u64) -> Self {
        Self {
            kind: NodeKind::ArchiveEntry,
            parent: None,
            size,
            owner: None,
            timestamps: None,
            children: Children::new(),
        }
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this node is a file on disk.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Insert a child, returning any node previously stored under that name.
    pub fn insert_child(&mut self, name: impl Into<CompactString>, child: Node) -> Option<Node> {
        self.children.insert(name.into(), child)
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Number of files (plain and compressed) in this subtree.
    pub fn file_count(&self) -> u64 {
        match self.kind {
            NodeKind::Directory => self.children.values().map(Node::file_count).sum(),
            NodeKind::File | NodeKind::CompressedFile => 1,
            NodeKind::ArchiveEntry => 0,
        }
    }

    /// Number of directories below this node, not counting itself.
    pub fn dir_count(&self) -> u64 {
        self.children
            .values()
            .filter(|c| c.is_dir())
            .map(|c| c.dir_count() + 1)
            .sum()
    }

    /// Sum of direct file lengths plus direct subdirectory sizes.
    ///
    /// Archive entries are not counted; they belong to their compressed file.
    pub fn direct_children_size(&self) -> u64 {
        self.children
            .values()
            .filter(|c| !c.kind.is_archive_entry())
            .map(|c| c.size)
            .sum()
    }

    /// Check the directory size invariant over the whole subtree.
    pub fn sizes_consistent(&self) -> bool {
        if !self.is_dir() {
            return true;
        }
        self.size == self.direct_children_size()
            && self.children.values().all(Node::sizes_consistent)
    }

    /// Visit every node below this one with its path relative to this node.
    pub fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&[&str], &Node),
    {
        let mut stack: Vec<&str> = Vec::new();
        self.walk_inner(&mut stack, f);
    }

    fn walk_inner<'a, F>(&'a self, stack: &mut Vec<&'a str>, f: &mut F)
    where
        F: FnMut(&[&str], &Node),
    {
        for (name, child) in &self.children {
            stack.push(name.as_str());
            f(stack, child);
            child.walk_inner(stack, f);
            stack.pop();
        }
    }
}
