//! Serializable snapshot report.
//!
//! The report is the output shape of a scan: one entry per name, with the
//! size rendered as a readable string and each timestamp split into a date
//! and a time-of-day field.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::format::readable_size;
use crate::node::{Node, NodeKind};
use crate::tree::Snapshot;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// One entry of a snapshot report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    /// Entry type label (`folder`, `file`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PathBuf>,

    pub size: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, SnapshotEntry>,
}

impl SnapshotEntry {
    /// Render a node and its subtree.
    pub fn from_node(node: &Node) -> Self {
        let timestamps = node.timestamps.unwrap_or_default();
        let (created_date, created_time) = split(timestamps.created);
        let (accessed_date, accessed_time) = split(timestamps.accessed);
        let (modified_date, modified_time) = split(timestamps.modified);

        Self {
            kind: node.kind.label().to_string(),
            parent: node.parent.clone(),
            size: readable_size(node.size),
            owner: node.owner.as_ref().map(|o| o.as_str().to_string()),
            created_date,
            created_time,
            accessed_date,
            accessed_time,
            modified_date,
            modified_time,
            children: node
                .children
                .iter()
                .map(|(name, child)| (name.to_string(), Self::from_node(child)))
                .collect(),
        }
    }

    /// Parse the type label back into a node kind.
    pub fn node_kind(&self) -> Option<NodeKind> {
        NodeKind::from_label(&self.kind)
    }
}

fn split(time: Option<SystemTime>) -> (Option<String>, Option<String>) {
    match time {
        Some(time) => {
            let local: DateTime<Local> = time.into();
            (
                Some(local.format(DATE_FORMAT).to_string()),
                Some(local.format(TIME_FORMAT).to_string()),
            )
        }
        None => (None, None),
    }
}

/// A complete report: the root entry keyed by the root's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotReport {
    pub entries: BTreeMap<String, SnapshotEntry>,
}

impl SnapshotReport {
    /// Build the report for a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(snapshot.root_name(), SnapshotEntry::from_node(&snapshot.root));
        Self { entries }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a report from JSON.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
