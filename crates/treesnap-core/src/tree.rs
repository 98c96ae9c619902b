//! Snapshot container and statistics.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::ScanWarning;
use crate::node::{Node, NodeKind, Owner};

/// Summary statistics for a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total size in bytes.
    pub total_size: u64,
    /// Total number of files, compressed files included.
    pub total_files: u64,
    /// Total number of directories below the root.
    pub total_dirs: u64,
    /// Number of compressed files.
    pub compressed_files: u64,
    /// Number of entries listed inside compressed files.
    pub archive_entries: u64,
    /// Maximum depth reached.
    pub max_depth: u32,
    /// Owners resolved to a real value.
    pub owners_resolved: u64,
    /// Owners that ended as `Unknown`.
    pub owners_unknown: u64,
    /// Owners that ended on exhausted transient retries.
    pub owners_transient: u64,
    /// Owners that failed unexpectedly.
    pub owners_unretrievable: u64,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute statistics for a finished tree.
    pub fn from_root(root: &Node) -> Self {
        let mut stats = Self {
            total_size: root.size,
            ..Self::default()
        };
        root.walk(&mut |path, node| stats.record(path.len() as u32, node));
        stats
    }

    fn record(&mut self, depth: u32, node: &Node) {
        match node.kind {
            NodeKind::Directory => {
                self.total_dirs += 1;
                self.max_depth = self.max_depth.max(depth);
            }
            NodeKind::File | NodeKind::CompressedFile => {
                self.total_files += 1;
                self.max_depth = self.max_depth.max(depth);
                if node.kind.is_compressed() {
                    self.compressed_files += 1;
                }
            }
            NodeKind::ArchiveEntry => self.archive_entries += 1,
        }
        match &node.owner {
            Some(Owner::Resolved(_)) => self.owners_resolved += 1,
            Some(Owner::Unknown) => self.owners_unknown += 1,
            Some(Owner::TransientFailure) => self.owners_transient += 1,
            Some(Owner::Unretrievable) => self.owners_unretrievable += 1,
            None => {}
        }
    }
}

/// Complete snapshot of a directory tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Root directory node.
    pub root: Node,

    /// Root path that was scanned.
    pub root_path: PathBuf,

    /// When this scan was performed.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// Scan configuration used.
    pub config: ScanConfig,

    /// Summary statistics.
    pub stats: TreeStats,

    /// Warnings encountered during scan.
    pub warnings: Vec<ScanWarning>,
}

impl Snapshot {
    /// Create a new snapshot; statistics are derived from the root.
    pub fn new(
        root: Node,
        root_path: PathBuf,
        config: ScanConfig,
        scan_duration: Duration,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        let stats = TreeStats::from_root(&root);
        Self {
            root,
            root_path,
            scanned_at: SystemTime::now(),
            scan_duration,
            config,
            stats,
            warnings,
        }
    }

    /// Name used for the root entry in reports.
    pub fn root_name(&self) -> String {
        self.root_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root_path.to_string_lossy().into_owned())
    }

    /// Get the total size of the tree.
    pub fn total_size(&self) -> u64 {
        self.root.size
    }

    /// Check if there were any warnings during scan.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Look up a node by its path relative to the root.
    pub fn node_at(&self, relative: impl AsRef<Path>) -> Option<&Node> {
        relative
            .as_ref()
            .iter()
            .try_fold(&self.root, |node, part| node.child(&part.to_string_lossy()))
    }

    /// Absolute paths of entries whose owner degraded on transient I/O.
    ///
    /// These are the entries worth re-running once the share is healthy.
    pub fn transient_owner_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if self.root.owner.as_ref().is_some_and(Owner::is_transient) {
            paths.push(self.root_path.clone());
        }
        self.root.walk(&mut |path, node| {
            if node.owner.as_ref().is_some_and(Owner::is_transient) {
                paths.push(path.iter().fold(self.root_path.clone(), |p, part| p.join(part)));
            }
        });
        paths
    }
}
