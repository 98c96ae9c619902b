//! Directory identity tracking for symlink cycle detection.

use std::fs::Metadata;

use dashmap::DashSet;

/// Tracks visited directories by (device, inode).
///
/// Only consulted when symlinks are followed; a link back to an ancestor
/// would otherwise make the walk endless.
#[derive(Debug, Default)]
pub struct VisitedDirs {
    seen: DashSet<(u64, u64)>,
}

impl VisitedDirs {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a directory. Returns `true` the first time it is seen.
    pub fn first_visit(&self, metadata: &Metadata) -> bool {
        match dir_identity(metadata) {
            Some(identity) => self.seen.insert(identity),
            None => true,
        }
    }

    /// Number of directories recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(unix)]
fn dir_identity(metadata: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn dir_identity(_metadata: &Metadata) -> Option<(u64, u64)> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_first_visit() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let visited = VisitedDirs::new();

        let meta = std::fs::metadata(dir.path()).unwrap();
        assert!(visited.first_visit(&meta));
        assert!(!visited.first_visit(&meta));

        let meta = std::fs::metadata(other.path()).unwrap();
        assert!(visited.first_visit(&meta));
        assert_eq!(visited.len(), 2);
    }
}
