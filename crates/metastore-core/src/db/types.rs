//! Outcome types returned by the store layer (`spec.md` §4.B, §4.D).

use serde::Serialize;

use crate::models::record::Record;

/// `createRecord` always reports whether a new row was actually inserted
/// (`spec.md` §9 open question — a live match is a silent no-op, not a
/// conflict).
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub record: Record,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: Record,
    pub previous: Option<Record>,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub record: Record,
    pub previous: Record,
}

#[derive(Debug, Clone)]
pub struct SoftDeleteOutcome {
    pub record: Record,
    pub mutated: bool,
}

#[derive(Debug, Clone)]
pub struct HardDeleteOutcome {
    pub previous: Record,
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub record: Record,
    pub previous: Record,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub records: Vec<Record>,
    pub total: i64,
}

/// Raw aggregation row for `listNamespaces` before cache wrapping
/// (`spec.md` §4.I). Owner counts are pre-sorted descending by count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceStats {
    pub namespace: String,
    #[serde(rename = "totalRecords")]
    pub total_records: i64,
    #[serde(rename = "deletedRecords")]
    pub deleted_records: i64,
    #[serde(rename = "lastUpdatedAt")]
    pub last_updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "ownerCounts")]
    pub owner_counts: Vec<OwnerCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerCount {
    pub owner: String,
    pub count: i64,
}
