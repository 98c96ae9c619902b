//! Directory size aggregation.

/// Running size of one directory.
///
/// File lengths are added while the directory is listed, subdirectory
/// sizes as each subdirectory completes. [`DirSize::finish`] consumes the
/// accumulator, so a directory's size is produced exactly once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirSize {
    files: u64,
    subdirs: u64,
    file_count: u64,
    subdir_count: u64,
}

impl DirSize {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the length of a direct file child.
    pub fn add_file(&mut self, len: u64) {
        self.files = self.files.saturating_add(len);
        self.file_count += 1;
    }

    /// Add the final size of a direct subdirectory.
    pub fn add_subdir(&mut self, size: u64) {
        self.subdirs = self.subdirs.saturating_add(size);
        self.subdir_count += 1;
    }

    /// Bytes contributed by direct files so far.
    pub fn file_bytes(&self) -> u64 {
        self.files
    }

    pub fn file_count(&self) -> u64 {
        self.file_count
    }

    pub fn subdir_count(&self) -> u64 {
        self.subdir_count
    }

    /// Final size: direct file lengths plus subdirectory sizes.
    pub fn finish(self) -> u64 {
        self.files.saturating_add(self.subdirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(DirSize::new().finish(), 0);
    }

    #[test]
    fn test_files_and_subdirs() {
        let mut size = DirSize::new();
        size.add_file(10);
        size.add_file(0);
        size.add_subdir(1000);
        size.add_subdir(5);

        assert_eq!(size.file_bytes(), 10);
        assert_eq!(size.file_count(), 2);
        assert_eq!(size.subdir_count(), 2);
        assert_eq!(size.finish(), 1015);
    }
}
