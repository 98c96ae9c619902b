//! Work-queue directory walker.
//!
//! The walk is driven by a single coordinator. It owns an arena of
//! directory slots and a bounded set of directory tasks. Each task lists
//! one directory, processes its direct files (stat, owner resolution and
//! archive listing run concurrently per file) and hands back the partly
//! built node together with the names of its subdirectories. The
//! coordinator queues those subdirectories and, once every subdirectory of
//! a directory has completed, finishes that directory's size and merges it
//! into its parent. Only the coordinator touches the arena, so merging
//! needs no locking.

use std::collections::{HashSet, VecDeque};
use std::ffi::{OsStr, OsString};
use std::fs::{self, FileType, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use compact_str::CompactString;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use treesnap_core::{
    Children, Node, Owner, ScanConfig, ScanError, ScanWarning, Snapshot, Timestamps, WarningKind,
};
use treesnap_owner::{AttributeResolver, IoGate, RetryError, RetryPolicy, StrategyError};

use crate::archive::ArchiveInspector;
use crate::filter::EntryFilter;
use crate::inode::VisitedDirs;
use crate::progress::{ProgressTracker, ScanProgress};
use crate::size::DirSize;

/// Concurrent snapshot builder.
pub struct TreeWalker {
    config: Arc<ScanConfig>,
    filter: EntryFilter,
    resolver: AttributeResolver,
    inspector: ArchiveInspector,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl TreeWalker {
    /// Create a walker with the built-in owner resolution pipeline.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let config = Arc::new(config);
        let filter = EntryFilter::new(Arc::clone(&config))?;
        let gate = IoGate::new(config.effective_io_concurrency());
        let resolver = AttributeResolver::from_config(&config, gate);
        let (progress_tx, _) = broadcast::channel(100);
        Ok(Self {
            config,
            filter,
            resolver,
            inspector: ArchiveInspector::new(),
            progress_tx,
        })
    }

    /// Replace the owner resolver. The walker uses the resolver's I/O gate
    /// for its own filesystem calls as well.
    pub fn with_resolver(mut self, resolver: AttributeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Walk the configured root and build a snapshot.
    ///
    /// Only failures on the root itself are returned as errors; anything
    /// below it degrades into warnings. Cancelling `cancel` aborts all
    /// outstanding work and returns [`ScanError::Interrupted`].
    pub async fn scan(&self, cancel: &CancellationToken) -> Result<Snapshot, ScanError> {
        let start = Instant::now();
        let context = Arc::new(WalkContext {
            config: Arc::clone(&self.config),
            filter: self.filter.clone(),
            resolver: self.resolver.clone(),
            inspector: self.inspector,
            stat_retry: RetryPolicy::new(self.config.retry),
            cancel: cancel.clone(),
            visited: VisitedDirs::new(),
        });

        let root_path = context.canonical_root().await?;
        info!(root = %root_path.display(), "scan started");

        let coordinator = Coordinator::new(context, root_path.clone(), self.progress_tx.clone());
        let (root, warnings) = coordinator.run().await?;

        let snapshot = Snapshot::new(
            root,
            root_path,
            (*self.config).clone(),
            start.elapsed(),
            warnings,
        );
        info!(
            files = snapshot.stats.total_files,
            dirs = snapshot.stats.total_dirs,
            bytes = snapshot.stats.total_size,
            warnings = snapshot.warnings.len(),
            elapsed = ?snapshot.scan_duration,
            "scan finished"
        );
        Ok(snapshot)
    }
}

impl std::fmt::Debug for TreeWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWalker")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// One directory in the coordinator's arena.
struct DirSlot {
    name: CompactString,
    path: PathBuf,
    parent: Option<usize>,
    node: Option<Node>,
    size: DirSize,
    pending: usize,
}

impl DirSlot {
    fn new(name: CompactString, path: PathBuf, parent: Option<usize>) -> Self {
        Self {
            name,
            path,
            parent,
            node: None,
            size: DirSize::new(),
            pending: 0,
        }
    }
}

struct Coordinator {
    context: Arc<WalkContext>,
    slots: Vec<DirSlot>,
    queue: VecDeque<usize>,
    progress: ProgressTracker,
    progress_tx: broadcast::Sender<ScanProgress>,
    warnings: Vec<ScanWarning>,
}

impl Coordinator {
    fn new(
        context: Arc<WalkContext>,
        root_path: PathBuf,
        progress_tx: broadcast::Sender<ScanProgress>,
    ) -> Self {
        Self {
            context,
            slots: vec![DirSlot::new(CompactString::default(), root_path, None)],
            queue: VecDeque::from([0]),
            progress: ProgressTracker::new(),
            progress_tx,
            warnings: Vec::new(),
        }
    }

    async fn run(mut self) -> Result<(Node, Vec<ScanWarning>), ScanError> {
        let limit = self.context.config.effective_dir_concurrency().max(1);
        let cancel = self.context.cancel.clone();
        let mut tasks: JoinSet<(usize, Result<DirListing, ScanError>)> = JoinSet::new();
        let mut root = None;

        loop {
            while tasks.len() < limit {
                let Some(id) = self.queue.pop_front() else {
                    break;
                };
                let context = Arc::clone(&self.context);
                let path = self.slots[id].path.clone();
                let is_root = id == 0;
                tasks.spawn(async move { (id, context.list_directory(path, is_root).await) });
            }

            let joined = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.shutdown().await;
                    return Err(ScanError::Interrupted);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };
            let (id, listing) = joined.map_err(|e| ScanError::Other {
                message: format!("Directory task failed: {e}"),
            })?;
            if let Some(node) = self.accept(id, listing?) {
                root = Some(node);
            }
        }

        if cancel.is_cancelled() {
            return Err(ScanError::Interrupted);
        }
        let root = root.ok_or_else(|| ScanError::Other {
            message: "Walk ended before the root completed".to_string(),
        })?;
        Ok((root, self.warnings))
    }

    /// Record a listed directory and queue its subdirectories. Returns the
    /// root node once it is complete.
    fn accept(&mut self, id: usize, listing: DirListing) -> Option<Node> {
        let DirListing {
            node,
            size,
            subdirs,
            warnings,
        } = listing;

        let path = self.slots[id].path.clone();
        let warning_count = warnings.len();
        self.warnings.extend(warnings);

        let pending = subdirs.len();
        for Subdir { key, name } in subdirs {
            let child = self.slots.len();
            let child_path = path.join(name);
            self.slots.push(DirSlot::new(key, child_path, Some(id)));
            self.queue.push_back(child);
        }

        self.progress.record_dir(
            &path,
            size.file_count(),
            size.file_bytes(),
            warning_count,
            self.queue.len(),
        );
        let _ = self.progress_tx.send(self.progress.snapshot());

        let slot = &mut self.slots[id];
        slot.node = Some(node);
        slot.size = size;
        slot.pending = pending;
        if pending == 0 {
            self.complete(id)
        } else {
            None
        }
    }

    /// Finish a directory whose subdirectories have all completed and
    /// merge it upward, continuing with each parent that becomes complete.
    fn complete(&mut self, mut id: usize) -> Option<Node> {
        loop {
            let slot = &mut self.slots[id];
            let mut node = slot.node.take()?;
            node.size = std::mem::take(&mut slot.size).finish();
            let name = std::mem::take(&mut slot.name);
            let Some(parent) = slot.parent else {
                return Some(node);
            };

            let parent_slot = &mut self.slots[parent];
            parent_slot.size.add_subdir(node.size);
            if let Some(parent_node) = parent_slot.node.as_mut() {
                parent_node.insert_child(name, node);
            }
            parent_slot.pending -= 1;
            if parent_slot.pending > 0 {
                return None;
            }
            id = parent;
        }
    }
}

/// Result of listing one directory.
struct DirListing {
    /// Directory node with its file children in place.
    node: Node,
    /// Size so far, holding the direct file lengths.
    size: DirSize,
    subdirs: Vec<Subdir>,
    warnings: Vec<ScanWarning>,
}

/// A subdirectory found while listing: its key in the parent's children
/// and its name on disk.
struct Subdir {
    key: CompactString,
    name: OsString,
}

impl DirListing {
    /// An empty directory standing in for one that could not be read.
    fn degraded(path: &Path, timestamps: Option<Timestamps>, warning: ScanWarning) -> Self {
        warn!(path = %path.display(), reason = %warning.message, "directory degraded to empty");
        Self {
            node: Node::new_directory(path.parent().map(Path::to_path_buf), timestamps),
            size: DirSize::new(),
            subdirs: Vec::new(),
            warnings: vec![warning],
        }
    }
}

enum FileOutcome {
    Entry {
        name: CompactString,
        node: Node,
        warnings: Vec<ScanWarning>,
    },
    Skipped(ScanWarning),
}

enum EntryKind {
    Dir,
    File,
}

struct RawEntry {
    name: OsString,
    file_type: FileType,
}

/// State shared by every task of one scan.
struct WalkContext {
    config: Arc<ScanConfig>,
    filter: EntryFilter,
    resolver: AttributeResolver,
    inspector: ArchiveInspector,
    stat_retry: RetryPolicy,
    cancel: CancellationToken,
    visited: VisitedDirs,
}

impl WalkContext {
    fn gate(&self) -> &IoGate {
        self.resolver.gate()
    }

    async fn canonical_root(&self) -> Result<PathBuf, ScanError> {
        let root = self.config.root.clone();
        let target = root.clone();
        match self.gate().run(move || fs::canonicalize(&target)).await {
            Ok(Ok(path)) => Ok(path),
            Ok(Err(error)) => Err(ScanError::io(root, error)),
            Err(error) => Err(ScanError::Other {
                message: error.to_string(),
            }),
        }
    }

    /// Stat an entry, retrying transient failures.
    async fn stat(&self, path: &Path, follow: bool) -> Result<Metadata, RetryError> {
        self.stat_retry
            .run(&self.cancel, |_attempt| {
                let gate = self.gate().clone();
                let path = path.to_path_buf();
                async move {
                    let metadata = gate
                        .run(move || {
                            if follow {
                                fs::metadata(&path)
                            } else {
                                fs::symlink_metadata(&path)
                            }
                        })
                        .await?;
                    metadata.map_err(StrategyError::from_io)
                }
            })
            .await
    }

    async fn list_directory(
        self: Arc<Self>,
        path: PathBuf,
        is_root: bool,
    ) -> Result<DirListing, ScanError> {
        let metadata = match self.stat(&path, is_root || self.config.follow_symlinks).await {
            Ok(metadata) => metadata,
            Err(error) if is_root => return Err(root_error(&path, error)),
            Err(RetryError::Cancelled) => return Err(ScanError::Interrupted),
            Err(error) => {
                let warning = stat_warning(&path, &error, WarningKind::ReadError);
                return Ok(DirListing::degraded(&path, None, warning));
            }
        };
        if is_root && !metadata.is_dir() {
            return Err(ScanError::NotADirectory { path });
        }
        let timestamps = Some(Timestamps::from_metadata(&metadata));

        if self.config.follow_symlinks && !self.visited.first_visit(&metadata) {
            let warning = ScanWarning::new(
                &path,
                "Directory already visited through another link",
                WarningKind::ReadError,
            );
            return Ok(DirListing::degraded(&path, timestamps, warning));
        }

        let target = path.clone();
        let entries = match self.gate().run(move || read_entries(&target)).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(error)) if is_root => return Err(ScanError::io(&path, error)),
            Ok(Err(error)) => {
                let warning = ScanWarning::enumeration(&path, &error);
                return Ok(DirListing::degraded(&path, timestamps, warning));
            }
            Err(error) if is_root => {
                return Err(ScanError::Other {
                    message: error.to_string(),
                });
            }
            Err(error) => {
                let warning = ScanWarning::new(&path, error.to_string(), WarningKind::ReadError);
                return Ok(DirListing::degraded(&path, timestamps, warning));
            }
        };

        let mut node = Node::new_directory(path.parent().map(Path::to_path_buf), timestamps);
        let mut warnings = Vec::new();
        let mut subdirs = Vec::new();
        let mut file_jobs = Vec::new();

        let mut raw_entries = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Ok(entry) => raw_entries.push(entry),
                Err(error) => warnings.push(ScanWarning::metadata(&path, &error)),
            }
        }
        // Sorted so that a key collision always drops the same entry.
        raw_entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut keys = HashSet::with_capacity(raw_entries.len());
        for entry in raw_entries {
            let key = entry_key(&entry.name);
            if self.filter.is_excluded(&key) {
                debug!(path = %path.display(), name = %key, "excluded");
                continue;
            }
            let child_path = path.join(&entry.name);
            let kind = match self.classify(&child_path, entry.file_type).await {
                Ok(Some(kind)) => kind,
                Ok(None) => continue,
                Err(warning) => {
                    warnings.push(warning);
                    continue;
                }
            };
            if !keys.insert(key.clone()) {
                warn!(
                    path = %child_path.display(),
                    name = %key,
                    "entry name collides with a sibling"
                );
                warnings.push(ScanWarning::new(
                    &child_path,
                    format!("Name collides with sibling entry '{key}'"),
                    WarningKind::ReadError,
                ));
                continue;
            }
            match kind {
                EntryKind::Dir => subdirs.push(Subdir {
                    key,
                    name: entry.name,
                }),
                EntryKind::File => file_jobs.push((key, child_path)),
            }
        }

        let owner = async {
            if self.config.resolve_directory_owners {
                Some(self.resolver.resolve_owner(&path, &self.cancel).await)
            } else {
                None
            }
        };
        let outcomes = async {
            let window = self.gate().capacity();
            let mut jobs = file_jobs.into_iter();
            let mut files = JoinSet::new();
            let mut outcomes = Vec::new();
            loop {
                while files.len() < window {
                    let Some((key, child_path)) = jobs.next() else {
                        break;
                    };
                    let context = Arc::clone(&self);
                    files.spawn(context.process_file(key, child_path, path.clone()));
                }
                match files.join_next().await {
                    Some(outcome) => outcomes.push(outcome),
                    None => break,
                }
            }
            outcomes
        };
        let (owner, outcomes) = tokio::join!(owner, outcomes);

        let mut size = DirSize::new();
        for outcome in outcomes {
            match outcome {
                Ok(FileOutcome::Entry {
                    name,
                    node: file,
                    warnings: file_warnings,
                }) => {
                    size.add_file(file.size);
                    warnings.extend(file_warnings);
                    node.insert_child(name, file);
                }
                Ok(FileOutcome::Skipped(warning)) => warnings.push(warning),
                Err(error) => {
                    warn!(path = %path.display(), %error, "file task failed");
                    warnings.push(ScanWarning::new(
                        &path,
                        format!("File task failed: {error}"),
                        WarningKind::MetadataError,
                    ));
                }
            }
        }

        if let Some(owner) = owner {
            if let Some(warning) = owner_warning(&path, &owner) {
                warnings.push(warning);
            }
            node.owner = Some(owner);
        }

        Ok(DirListing {
            node,
            size,
            subdirs,
            warnings,
        })
    }

    /// Decide whether an entry is walked as a directory, processed as a
    /// file, or skipped. Symlinks are only resolved when following them.
    async fn classify(
        &self,
        path: &Path,
        file_type: FileType,
    ) -> Result<Option<EntryKind>, ScanWarning> {
        if file_type.is_dir() {
            return Ok(Some(EntryKind::Dir));
        }
        if file_type.is_file() {
            return Ok(Some(EntryKind::File));
        }
        if !file_type.is_symlink() || !self.config.follow_symlinks {
            debug!(path = %path.display(), "skipping special entry");
            return Ok(None);
        }
        match self.stat(path, true).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(EntryKind::Dir)),
            Ok(metadata) if metadata.is_file() => Ok(Some(EntryKind::File)),
            Ok(_) => Ok(None),
            Err(error) => Err(stat_warning(path, &error, WarningKind::MetadataError)),
        }
    }

    async fn process_file(
        self: Arc<Self>,
        name: CompactString,
        path: PathBuf,
        parent: PathBuf,
    ) -> FileOutcome {
        let metadata = match self.stat(&path, self.config.follow_symlinks).await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping file without metadata");
                let warning = stat_warning(&path, &error, WarningKind::MetadataError);
                return FileOutcome::Skipped(warning);
            }
        };

        let compressed = self.config.is_archive_name(&name);
        let mut node = Node::new_file(
            parent,
            metadata.len(),
            Timestamps::from_metadata(&metadata),
            compressed,
        );
        let mut warnings = Vec::new();

        let owner = self.resolver.resolve(&path, &self.cancel);
        let children = async {
            if compressed {
                Some(self.inspect(&path).await)
            } else {
                None
            }
        };
        let (owner, children) = tokio::join!(owner, children);

        match children {
            Some(Ok(children)) => node.children = children,
            Some(Err(message)) => {
                warn!(path = %path.display(), error = %message, "archive listing failed");
                warnings.push(ScanWarning::archive(&path, message));
            }
            None => {}
        }
        if let Some(warning) = owner_warning(&path, &owner) {
            warnings.push(warning);
        }
        node.owner = Some(owner);

        FileOutcome::Entry {
            name,
            node,
            warnings,
        }
    }

    async fn inspect(&self, path: &Path) -> Result<Children, String> {
        let inspector = self.inspector;
        let target = path.to_path_buf();
        match self.gate().run(move || inspector.inspect(&target)).await {
            Ok(Ok(children)) => Ok(children),
            Ok(Err(error)) => Err(error.to_string()),
            Err(error) => Err(error.to_string()),
        }
    }
}

fn read_entries(path: &Path) -> io::Result<Vec<io::Result<RawEntry>>> {
    Ok(fs::read_dir(path)?
        .map(|entry| {
            let entry = entry?;
            Ok(RawEntry {
                name: entry.file_name(),
                file_type: entry.file_type()?,
            })
        })
        .collect())
}

/// Key of an entry in its parent's children.
///
/// Valid UTF-8 names are used as they are. Bytes that are not valid UTF-8
/// are written as `\xNN`, so distinct names on disk keep distinct keys.
#[cfg(unix)]
fn entry_key(name: &OsStr) -> CompactString {
    use std::fmt::Write;
    use std::os::unix::ffi::OsStrExt;

    let mut key = CompactString::default();
    for chunk in name.as_bytes().utf8_chunks() {
        key.push_str(chunk.valid());
        for byte in chunk.invalid() {
            let _ = write!(key, "\\x{byte:02x}");
        }
    }
    key
}

#[cfg(not(unix))]
fn entry_key(name: &OsStr) -> CompactString {
    CompactString::from(name.to_string_lossy().as_ref())
}

fn root_error(path: &Path, error: RetryError) -> ScanError {
    match error {
        RetryError::Cancelled => ScanError::Interrupted,
        RetryError::Permanent(StrategyError::PermissionDenied) => ScanError::PermissionDenied {
            path: path.to_path_buf(),
        },
        RetryError::Permanent(StrategyError::NotFound) => ScanError::NotFound {
            path: path.to_path_buf(),
        },
        RetryError::Permanent(StrategyError::Io(source))
        | RetryError::Exhausted {
            source: StrategyError::Transient(source),
            ..
        } => ScanError::io(path, source),
        other => ScanError::Other {
            message: other.to_string(),
        },
    }
}

fn stat_warning(path: &Path, error: &RetryError, kind: WarningKind) -> ScanWarning {
    let kind = match error {
        RetryError::Permanent(StrategyError::PermissionDenied) => WarningKind::PermissionDenied,
        _ => kind,
    };
    ScanWarning::new(path, format!("Metadata error: {error}"), kind)
}

fn owner_warning(path: &Path, owner: &Owner) -> Option<ScanWarning> {
    matches!(owner, Owner::TransientFailure | Owner::Unretrievable).then(|| {
        ScanWarning::new(
            path,
            format!("Owner degraded: {owner}"),
            WarningKind::OwnerDegraded,
        )
    })
}
