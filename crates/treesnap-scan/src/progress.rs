//! Scan progress reporting.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Progress information during a scan.
///
/// One update is broadcast per listed directory, so file counts advance in
/// steps of whole directories.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    /// Files whose metadata has been recorded.
    pub files_scanned: u64,
    /// Directories fully listed.
    pub dirs_scanned: u64,
    /// Directories discovered but not yet listed.
    pub dirs_queued: u64,
    /// Bytes of the recorded files.
    pub bytes_scanned: u64,
    /// Directory most recently listed.
    pub current_path: PathBuf,
    /// Warnings collected so far.
    pub warnings: u64,
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Files recorded per second of wall time.
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files_scanned as f64 / secs
        } else {
            0.0
        }
    }

    /// Share of discovered directories already listed, in `0.0..=1.0`.
    ///
    /// The total grows as the walk discovers more of the tree, so this is
    /// a lower bound on how far along the scan is.
    pub fn dirs_fraction(&self) -> f64 {
        let seen = self.dirs_scanned + self.dirs_queued;
        if seen == 0 {
            0.0
        } else {
            self.dirs_scanned as f64 / seen as f64
        }
    }
}

/// Running counters owned by the walk coordinator.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    started: Instant,
    current: ScanProgress,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            current: ScanProgress::default(),
        }
    }

    /// Record one listed directory, its direct files and the number of
    /// directories still waiting to be listed.
    pub fn record_dir(&mut self, path: &Path, files: u64, bytes: u64, warnings: usize, queued: usize) {
        let current = &mut self.current;
        current.dirs_scanned += 1;
        current.dirs_queued = queued as u64;
        current.files_scanned += files;
        current.bytes_scanned += bytes;
        current.warnings += warnings as u64;
        current.current_path = path.to_path_buf();
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            elapsed: self.started.elapsed(),
            ..self.current.clone()
        }
    }
}
