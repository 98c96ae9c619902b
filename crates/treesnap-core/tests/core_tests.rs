use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use treesnap_core::{
    ExtensionClass, FormatTable, Node, NodeKind, Owner, ScanConfig, Snapshot, SnapshotReport,
    Timestamps, readable_size,
};

fn timestamps() -> Timestamps {
    let now = SystemTime::now();
    Timestamps::new(
        Some(now - Duration::from_secs(7200)),
        Some(now - Duration::from_secs(60)),
        Some(now - Duration::from_secs(3600)),
    )
}

fn sample_tree() -> Node {
    let mut archive = Node::new_file("/share/projects", 4096, timestamps(), true);
    archive.owner = Some(Owner::Resolved("carol".into()));
    archive.insert_child("src/main.rs", Node::new_archive_entry(12_000));
    archive.insert_child("README.md", Node::new_archive_entry(800));

    let mut report = Node::new_file("/share/projects", 1500, timestamps(), false);
    report.owner = Some(Owner::Resolved("alice".into()));

    let mut projects = Node::new_directory(Some("/share".into()), Some(timestamps()));
    projects.owner = Some(Owner::Unknown);
    projects.insert_child("code.zip", archive);
    projects.insert_child("report.docx", report);
    projects.size = 5596;

    let mut notes = Node::new_file("/share", 20, timestamps(), false);
    notes.owner = Some(Owner::TransientFailure);

    let mut root = Node::new_directory(Some("/".into()), Some(timestamps()));
    root.owner = Some(Owner::Resolved("root".into()));
    root.insert_child("projects", projects);
    root.insert_child("notes.txt", notes);
    root.size = 5616;
    root
}

#[test]
fn test_sample_tree_sizes_consistent() {
    let root = sample_tree();
    assert!(root.sizes_consistent());
    assert_eq!(root.file_count(), 3);
    assert_eq!(root.dir_count(), 1);

    let mut broken = root.clone();
    broken.size += 1;
    assert!(!broken.sizes_consistent());
}

#[test]
fn test_report_round_trip() {
    let snapshot = Snapshot::new(
        sample_tree(),
        PathBuf::from("/share"),
        ScanConfig::new("/share"),
        Duration::from_millis(12),
        Vec::new(),
    );

    let report = SnapshotReport::from_snapshot(&snapshot);
    let json = report.to_json_pretty().unwrap();
    let parsed = SnapshotReport::from_json(&json).unwrap();
    assert_eq!(report, parsed);

    let root = &parsed.entries["share"];
    assert_eq!(root.node_kind(), Some(NodeKind::Directory));
    assert_eq!(root.size, readable_size(5616));
    let archive = &root.children["projects"].children["code.zip"];
    assert_eq!(archive.kind, "compressed file");
    assert_eq!(archive.children.len(), 2);
    for entry in archive.children.values() {
        assert!(entry.owner.is_none());
        assert!(entry.children.is_empty());
        assert!(entry.parent.is_none());
    }
    assert_eq!(
        root.children["notes.txt"].owner.as_deref(),
        Some("Unknown due to network disturbances")
    );
}

#[test]
fn test_node_serde_round_trip() {
    let root = sample_tree();
    let json = serde_json::to_string(&root).unwrap();
    let parsed: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(root, parsed);
}

#[test]
fn test_snapshot_stats() {
    let snapshot = Snapshot::new(
        sample_tree(),
        PathBuf::from("/share"),
        ScanConfig::new("/share"),
        Duration::ZERO,
        Vec::new(),
    );

    assert_eq!(snapshot.total_size(), 5616);
    assert_eq!(snapshot.stats.total_files, 3);
    assert_eq!(snapshot.stats.compressed_files, 1);
    assert_eq!(snapshot.stats.archive_entries, 2);
    assert_eq!(snapshot.stats.owners_unknown, 1);
    assert_eq!(snapshot.stats.owners_transient, 1);
    assert_eq!(
        snapshot.transient_owner_paths(),
        vec![PathBuf::from("/share/notes.txt")]
    );
}

#[test]
fn test_format_table_round_trips_through_toml() {
    let table = FormatTable::empty()
        .with(ExtensionClass::Pdf, &["pdf"])
        .with(ExtensionClass::Media, &[".PNG", "mp3"]);
    assert_eq!(table.extensions(ExtensionClass::Media), ["png", "mp3"]);

    let mut config = ScanConfig::new("/share");
    config.formats = table.clone();
    let text = toml::to_string(&config).unwrap();
    let parsed = ScanConfig::from_toml_str(&text).unwrap();
    assert_eq!(parsed.formats, table);
}

#[test]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "root = \"/data\"\nlock_prefix = \"~lock.\"\n").unwrap();

    let config = ScanConfig::from_toml_file(&path).unwrap();
    assert!(config.is_excluded_name("~lock.report.odt#"));
    assert!(!config.is_excluded_name("~$report.docx"));

    assert!(ScanConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    assert!(ScanConfig::from_toml_str("io_concurrency = \"lots\"").is_err());
}
