//! Filesystem owner identity.

use std::path::Path;

use dashmap::DashMap;

use crate::error::StrategyError;
use crate::strategy::OwnerSource;

/// Reads the owning account of an entry from the filesystem.
///
/// Account lookups are memoized per uid; a scan touches the same handful
/// of accounts over and over.
#[derive(Debug, Default)]
pub struct FsOwnerSource {
    #[cfg_attr(not(unix), allow(dead_code))]
    names: DashMap<u32, String>,
}

impl FsOwnerSource {
    /// Create a source with an empty account cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached account names.
    pub fn cached_accounts(&self) -> usize {
        self.names.len()
    }

    #[cfg(unix)]
    fn account_name(&self, uid: u32) -> String {
        if let Some(name) = self.names.get(&uid) {
            return name.clone();
        }
        let name = uzers::get_user_by_uid(uid)
            .map(|user| user.name().to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| uid.to_string());
        self.names.insert(uid, name.clone());
        name
    }
}

impl OwnerSource for FsOwnerSource {
    #[cfg(unix)]
    fn owner(&self, path: &Path) -> Result<Option<String>, StrategyError> {
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::symlink_metadata(path)?;
        Ok(Some(self.account_name(metadata.uid())))
    }

    #[cfg(not(unix))]
    fn owner(&self, _path: &Path) -> Result<Option<String>, StrategyError> {
        Err(StrategyError::Unsupported)
    }
}

/// Strip a domain qualifier, keeping the segment after the last `\` or `//`.
pub fn normalize_account(raw: &str) -> &str {
    let after_backslash = raw.rfind('\\').map(|i| i + 1);
    let after_slashes = raw.rfind("//").map(|i| i + 2);
    match after_backslash.max(after_slashes) {
        Some(start) => &raw[start..],
        None => raw,
    }
}
