//! Concurrent directory walker for treesnap.
//!
//! This crate turns a directory tree into a [`Snapshot`]: every file and
//! directory with its size, timestamps and owner, and the entries of any
//! compressed files.
//!
//! # Overview
//!
//! - **Bounded concurrency**: directories are listed from a work queue by a
//!   bounded set of tasks, and every blocking filesystem call goes through
//!   one shared [`IoGate`](treesnap_owner::IoGate).
//! - **Single-pass sizes**: a directory's size is computed once, when its
//!   last subdirectory completes ([`DirSize`]).
//! - **Degradation, not failure**: unreadable subdirectories, archives and
//!   metadata become warnings; only the root is fatal.
//! - **Cancellation** through a [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! # Example
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use treesnap_scan::{ScanConfig, TreeWalker};
//!
//! # async fn run() -> Result<(), treesnap_scan::ScanError> {
//! let walker = TreeWalker::new(ScanConfig::new("/srv/share"))?;
//! let snapshot = walker.scan(&CancellationToken::new()).await?;
//!
//! println!("Total size: {} bytes", snapshot.total_size());
//! println!("Total files: {}", snapshot.stats.total_files);
//! # Ok(())
//! # }
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! # use treesnap_scan::{ScanConfig, TreeWalker};
//! # fn run(walker: TreeWalker) {
//! let mut progress_rx = walker.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//! # }
//! ```

mod archive;
mod filter;
mod inode;
mod progress;
mod size;
mod walker;

pub use archive::{ArchiveError, ArchiveInspector, ArchiveKind};
pub use filter::EntryFilter;
pub use inode::VisitedDirs;
pub use progress::ScanProgress;
pub use size::DirSize;
pub use walker::TreeWalker;

// Re-export core types for convenience
pub use treesnap_core::{
    Node, NodeKind, Owner, ScanConfig, ScanError, ScanWarning, Snapshot, Timestamps, TreeStats,
    WarningKind,
};
