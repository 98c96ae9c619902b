//! Core types for treesnap.
//!
//! This crate provides the data structures shared by the scanner and the
//! owner resolver: snapshot nodes, the snapshot container, configuration,
//! errors and the serializable report.

mod config;
mod error;
mod format;
mod node;
mod report;
mod tree;

pub use config::{ExtensionClass, FormatTable, RetryConfig, ScanConfig, ScanConfigBuilder};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use format::{parse_readable_size, readable_size};
pub use node::{
    Children, Node, NodeKind, Owner, Timestamps, TRANSIENT_OWNER, UNKNOWN_OWNER,
    UNRETRIEVABLE_OWNER,
};
pub use report::{SnapshotEntry, SnapshotReport};
pub use tree::{Snapshot, TreeStats};
