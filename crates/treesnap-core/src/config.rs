//! Scan configuration types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::ScanError;

/// Family of file formats sharing one author-reading strategy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExtensionClass {
    /// Word-processing documents.
    Document,
    /// Spreadsheets.
    Spreadsheet,
    /// Slide decks.
    Presentation,
    /// PDF files.
    Pdf,
    /// Audio, image and video files with embedded tags.
    Media,
}

impl ExtensionClass {
    /// Default extensions for this class.
    pub fn default_extensions(&self) -> &'static [&'static str] {
        match self {
            ExtensionClass::Document => &["docx", "dotx", "docm", "dotm", "doc"],
            ExtensionClass::Spreadsheet => &["xlsx", "xltx", "xlsm", "xltm", "xls"],
            ExtensionClass::Presentation => &["pptx", "potx", "pptm", "potm", "ppt"],
            ExtensionClass::Pdf => &["pdf"],
            ExtensionClass::Media => &["jpg", "jpeg", "png", "mp3", "wav", "avi", "mp4"],
        }
    }
}

/// Mapping from extension class to the extensions it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatTable {
    classes: BTreeMap<ExtensionClass, Vec<String>>,
}

impl FormatTable {
    /// Create an empty table.
    pub fn empty() -> Self {
        Self {
            classes: BTreeMap::new(),
        }
    }

    /// Replace the extensions registered for a class.
    pub fn set(&mut self, class: ExtensionClass, extensions: Vec<String>) {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self.classes.insert(class, extensions);
    }

    /// Builder-style variant of [`FormatTable::set`].
    pub fn with(mut self, class: ExtensionClass, extensions: &[&str]) -> Self {
        self.set(class, extensions.iter().map(|e| e.to_string()).collect());
        self
    }

    /// Extensions registered for a class.
    pub fn extensions(&self, class: ExtensionClass) -> &[String] {
        self.classes.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find the class an extension belongs to.
    pub fn class_of(&self, extension: &str) -> Option<ExtensionClass> {
        let extension = extension.trim_start_matches('.');
        self.classes.iter().find_map(|(class, exts)| {
            exts.iter()
                .any(|e| e.eq_ignore_ascii_case(extension))
                .then_some(*class)
        })
    }

    /// Iterate over classes and their extensions.
    pub fn iter(&self) -> impl Iterator<Item = (ExtensionClass, &[String])> {
        self.classes.iter().map(|(c, e)| (*c, e.as_slice()))
    }

    /// Return the first extension registered under more than one class.
    pub fn duplicate_extension(&self) -> Option<&str> {
        let mut seen: BTreeMap<String, ExtensionClass> = BTreeMap::new();
        for (class, exts) in &self.classes {
            for ext in exts {
                if let Some(previous) = seen.insert(ext.to_ascii_lowercase(), *class) {
                    if previous != *class {
                        return Some(ext.as_str());
                    }
                }
            }
        }
        None
    }
}

impl Default for FormatTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for class in ExtensionClass::iter() {
            table.set(
                class,
                class
                    .default_extensions()
                    .iter()
                    .map(|e| e.to_string())
                    .collect(),
            );
        }
        table
    }
}

/// Exponential backoff settings for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base; attempt `n` waits `base^n` units.
    #[serde(default = "default_base")]
    pub base: u32,

    /// Length of one backoff unit in milliseconds.
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
}

impl RetryConfig {
    /// Delay to wait after the failed attempt with the given index.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.base).saturating_pow(attempt);
        Duration::from_millis(self.unit_ms.saturating_mul(factor))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base: default_base(),
            unit_ms: default_unit_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base() -> u32 {
    2
}

fn default_unit_ms() -> u64 {
    1000
}

/// Configuration for scanning operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Names starting with this prefix are temp-lock files and skipped.
    #[builder(default = "default_lock_prefix()")]
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,

    /// Extensions of shortcut files, which are skipped.
    #[builder(default = "default_shortcut_extensions()")]
    #[serde(default = "default_shortcut_extensions")]
    pub shortcut_extensions: Vec<String>,

    /// Extensions that mark a file as a compressed container.
    #[builder(default = "default_archive_extensions()")]
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    /// Additional names to skip (glob syntax).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links to directories.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Directories processed concurrently (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub max_concurrent_dirs: usize,

    /// Concurrent blocking filesystem operations (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub io_concurrency: usize,

    /// Resolve owners for directories as well as files.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub resolve_directory_owners: bool,

    /// Backoff for transient failures.
    #[builder(default)]
    #[serde(default)]
    pub retry: RetryConfig,

    /// Extension classes used for author lookup.
    #[builder(default)]
    #[serde(default)]
    pub formats: FormatTable,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_lock_prefix() -> String {
    "~$".to_string()
}

fn default_shortcut_extensions() -> Vec<String> {
    vec!["lnk".to_string()]
}

fn default_archive_extensions() -> Vec<String> {
    ["zip", "tar", "tgz", "tar.gz", "tar.xz", "txz", "tar.bz2", "tbz2"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if let Some(ref retry) = self.retry {
            check_retry(retry)?;
        }
        if let Some(ext) = self.formats.as_ref().and_then(|f| f.duplicate_extension()) {
            return Err(format!("Extension '{ext}' is registered for more than one class"));
        }
        Ok(())
    }
}

fn check_retry(retry: &RetryConfig) -> Result<(), String> {
    if retry.max_attempts == 0 {
        return Err("Retry attempts must be at least 1".to_string());
    }
    Ok(())
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_prefix: default_lock_prefix(),
            shortcut_extensions: default_shortcut_extensions(),
            archive_extensions: default_archive_extensions(),
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            max_concurrent_dirs: 0,
            io_concurrency: 0,
            retry: RetryConfig::default(),
            formats: FormatTable::default(),
            resolve_directory_owners: true,
        }
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ScanError> {
        let config: Self = toml::from_str(text).map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Location of the per-user config file, if a config directory exists.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("treesnap").join("config.toml"))
    }

    /// Check invariants that the builder checks, for configs built otherwise.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: String| ScanError::InvalidConfig { message };
        if self.root.as_os_str().is_empty() {
            return Err(invalid("Root path cannot be empty".to_string()));
        }
        check_retry(&self.retry).map_err(invalid)?;
        if let Some(ext) = self.formats.duplicate_extension() {
            return Err(invalid(format!(
                "Extension '{ext}' is registered for more than one class"
            )));
        }
        Ok(())
    }

    /// Check if a name is a temp-lock file or a shortcut.
    pub fn is_excluded_name(&self, name: &str) -> bool {
        (!self.lock_prefix.is_empty() && name.starts_with(&self.lock_prefix))
            || has_any_extension(name, &self.shortcut_extensions)
    }

    /// Check if a file name denotes an archive container.
    pub fn is_archive_name(&self, name: &str) -> bool {
        has_any_extension(name, &self.archive_extensions)
    }

    /// Effective number of concurrent blocking I/O operations.
    pub fn effective_io_concurrency(&self) -> usize {
        match self.io_concurrency {
            0 => (available_parallelism() * 2).max(8),
            n => n,
        }
    }

    /// Effective number of directories processed at once.
    pub fn effective_dir_concurrency(&self) -> usize {
        match self.max_concurrent_dirs {
            0 => self.effective_io_concurrency() * 4,
            n => n,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Case-insensitive `.ext` suffix check that also handles `tar.gz`-style
/// compound extensions.
fn has_any_extension(name: &str, extensions: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    extensions.iter().any(|ext| {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        !ext.is_empty()
            && lower.len() > ext.len() + 1
            && lower.ends_with(&ext)
            && lower.as_bytes()[lower.len() - ext.len() - 1] == b'.'
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .root("/srv/share")
            .io_concurrency(4usize)
            .follow_symlinks(true)
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/share"));
        assert_eq!(config.io_concurrency, 4);
        assert!(config.follow_symlinks);
        assert_eq!(config.lock_prefix, "~$");
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        let result = ScanConfig::builder()
            .root("/srv/share")
            .retry(RetryConfig {
                max_attempts: 0,
                ..RetryConfig::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_shared_extension() {
        let formats = FormatTable::default().with(ExtensionClass::Pdf, &["pdf", "docx"]);
        let result = ScanConfig::builder()
            .root("/srv/share")
            .formats(formats)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_excluded_names() {
        let config = ScanConfig::new("/test");
        assert!(config.is_excluded_name("~$report.docx"));
        assert!(config.is_excluded_name("Desktop.LNK"));
        assert!(!config.is_excluded_name("report.docx"));
        assert!(!config.is_excluded_name("lnk"));
    }

    #[test]
    fn test_archive_names() {
        let config = ScanConfig::new("/test");
        assert!(config.is_archive_name("backup.zip"));
        assert!(config.is_archive_name("logs.tar.gz"));
        assert!(config.is_archive_name("LOGS.TGZ"));
        assert!(!config.is_archive_name("notes.gz"));
        assert!(!config.is_archive_name("zip"));
    }

    #[test]
    fn test_retry_delay() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay(0), Duration::from_secs(1));
        assert_eq!(retry.delay(1), Duration::from_secs(2));
        assert_eq!(retry.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_format_table_lookup() {
        let table = FormatTable::default();
        assert_eq!(table.class_of("DOCX"), Some(ExtensionClass::Document));
        assert_eq!(table.class_of(".pdf"), Some(ExtensionClass::Pdf));
        assert_eq!(table.class_of("mp3"), Some(ExtensionClass::Media));
        assert_eq!(table.class_of("txt"), None);
        assert!(table.duplicate_extension().is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = ScanConfig::from_toml_str(
            r#"
            root = "/mnt/share"
            io_concurrency = 16
            ignore_patterns = ["*.tmp"]

            [retry]
            max_attempts = 5
            unit_ms = 10

            [formats]
            pdf = ["pdf"]
            media = ["png", "flac"]
            "#,
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/mnt/share"));
        assert_eq!(config.io_concurrency, 16);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base, 2);
        assert_eq!(config.formats.class_of("flac"), Some(ExtensionClass::Media));
        assert_eq!(config.formats.class_of("docx"), None);
        assert!(config.resolve_directory_owners);
    }
}
