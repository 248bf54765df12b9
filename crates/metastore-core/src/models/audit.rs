//! Audit entry data structures (`spec.md` §3, §4.C).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The action that produced an audit entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Restore,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Restore => "restore",
        }
    }
}

/// An append-only snapshot of a single record mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: i64,
    pub namespace: String,
    pub key: String,
    pub action: AuditAction,
    pub actor: Option<String>,
    #[serde(rename = "previousVersion")]
    pub previous_version: Option<i64>,
    pub version: i64,
    pub metadata: Value,
    #[serde(rename = "previousMetadata")]
    pub previous_metadata: Value,
    pub tags: Vec<String>,
    #[serde(rename = "previousTags")]
    pub previous_tags: Vec<String>,
    pub owner: Option<String>,
    #[serde(rename = "previousOwner")]
    pub previous_owner: Option<String>,
    #[serde(rename = "schemaHash")]
    pub schema_hash: Option<String>,
    #[serde(rename = "previousSchemaHash")]
    pub previous_schema_hash: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// The metadata/tags/owner/schemaHash snapshot a restore applies.
#[derive(Debug, Clone)]
pub struct AuditSnapshot {
    pub metadata: Value,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub schema_hash: Option<String>,
}

impl From<&AuditEntry> for AuditSnapshot {
    fn from(entry: &AuditEntry) -> Self {
        AuditSnapshot {
            metadata: entry.metadata.clone(),
            tags: entry.tags.clone(),
            owner: entry.owner.clone(),
            schema_hash: entry.schema_hash.clone(),
        }
    }
}

/// Either side of an audit diff's metadata section
/// (`spec.md` §4.J diff endpoint).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangedPath {
    pub path: String,
    pub before: Value,
    pub after: Value,
}

/// A structured diff between two audit snapshots, computed out of band
/// (not persisted) per `spec.md` §4.C / §4.J.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditDiff {
    pub metadata: MetadataDiff,
    pub tags: TagDiff,
    pub owner: ScalarDiff,
    #[serde(rename = "schemaHash")]
    pub schema_hash: ScalarDiff,
    pub previous: AuditSnapshotView,
    pub current: AuditSnapshotView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MetadataDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<ChangedPath>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TagDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScalarDiff {
    pub before: Value,
    pub after: Value,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditSnapshotView {
    pub metadata: Value,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    #[serde(rename = "schemaHash")]
    pub schema_hash: Option<String>,
}
