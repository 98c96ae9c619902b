//! Strategy traits consumed by the resolver.

use std::path::Path;

use crate::error::StrategyError;

/// Reads an author or creator string embedded in a file format.
///
/// Implementations do blocking I/O; the resolver runs them on the blocking
/// pool behind the I/O gate.
pub trait AuthorStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Read the author of the file at `path`.
    fn read_author(&self, path: &Path) -> Result<String, StrategyError>;
}

/// Reads the access-control owner identity of a filesystem entry.
pub trait OwnerSource: Send + Sync {
    /// Return the raw owner identity, or `None` when the entry has none.
    fn owner(&self, path: &Path) -> Result<Option<String>, StrategyError>;
}
