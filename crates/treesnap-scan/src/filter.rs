//! Entry exclusion.

use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use treesnap_core::{ScanConfig, ScanError};

/// Decides which directory entries are left out of the snapshot.
///
/// An entry is skipped when its name starts with the lock-file prefix,
/// ends in a shortcut extension, or matches one of the ignore globs.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    config: Arc<ScanConfig>,
    ignore: GlobSet,
}

impl EntryFilter {
    /// Build a filter, compiling the configured ignore patterns.
    pub fn new(config: Arc<ScanConfig>) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
                message: format!("Invalid ignore pattern '{pattern}': {e}"),
            })?;
            builder.add(glob);
        }
        let ignore = builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        Ok(Self { config, ignore })
    }

    /// Check if an entry name is excluded.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.config.is_excluded_name(name) || self.ignore.is_match(name)
    }
}
