//! Record data structures
//!
//! This module defines the `Record` type — the central entity of the
//! metastore. A record is identified by the ordered pair `(namespace, key)`
//! and carries an arbitrary JSON `metadata` object plus a normalised tag
//! set, version counter and lifecycle timestamps.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Validation errors for record-shaped input.
///
/// Mirrors the constraints in `spec.md` §3 so a single error type can be
/// surfaced from both the structured HTTP payload validation and direct
/// library callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("namespace must be non-empty, alphanumeric plus ':_-', start alphanumeric, and at most 128 characters: {0:?}")]
    InvalidNamespace(String),

    #[error("key must be non-empty and at most 256 characters")]
    InvalidKey,

    #[error("metadata must be a JSON object")]
    MetadataNotObject,

    #[error("tags must contain at most 128 entries")]
    TooManyTags,

    #[error("schemaHash must be at least 6 characters when present")]
    SchemaHashTooShort,

    #[error("patch must set at least one of metadata, metadataUnset, tags, owner or schemaHash")]
    EmptyPatch,
}

/// Validate a namespace string against `spec.md` §3.
pub fn validate_namespace(namespace: &str) -> Result<(), ValidationError> {
    if namespace.is_empty() || namespace.len() > 128 {
        return Err(ValidationError::InvalidNamespace(namespace.to_string()));
    }
    let mut chars = namespace.chars();
    let first = chars.next().expect("checked non-empty above");
    if !first.is_ascii_alphanumeric() {
        return Err(ValidationError::InvalidNamespace(namespace.to_string()));
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'))
    {
        return Err(ValidationError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

/// Validate a record key string against `spec.md` §3.
pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() || key.len() > 256 {
        return Err(ValidationError::InvalidKey);
    }
    Ok(())
}

/// Normalise a raw tag list: trim, drop empties, dedupe, cap at 128.
///
/// Returns tags in sorted order so two equivalent tag sets always compare
/// equal regardless of input ordering (`spec.md` §8 property 2).
pub fn normalize_tags(raw: impl IntoIterator<Item = String>) -> Result<Vec<String>, ValidationError> {
    let mut set: BTreeSet<String> = BTreeSet::new();
    for tag in raw {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        set.insert(trimmed.to_string());
    }
    if set.len() > 128 {
        return Err(ValidationError::TooManyTags);
    }
    Ok(set.into_iter().collect())
}

/// Validate that a schema hash, if present, meets the minimum length.
pub fn validate_schema_hash(hash: Option<&str>) -> Result<(), ValidationError> {
    match hash {
        Some(h) if h.len() < 6 => Err(ValidationError::SchemaHashTooShort),
        _ => Ok(()),
    }
}

/// Validate that a metadata value is a JSON object.
pub fn validate_metadata(value: &Value) -> Result<(), ValidationError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ValidationError::MetadataNotObject)
    }
}

/// A persisted metastore record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub namespace: String,
    pub key: String,
    pub metadata: Value,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    #[serde(rename = "schemaHash")]
    pub schema_hash: Option<String>,
    pub version: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "deletedAt")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdBy")]
    pub created_by: Option<String>,
    #[serde(rename = "updatedBy")]
    pub updated_by: Option<String>,
}

impl Record {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input payload for a record create.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewRecordInput {
    pub metadata: Value,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    #[serde(rename = "schemaHash")]
    pub schema_hash: Option<String>,
}

/// Input payload for a full upsert (`spec.md` §4.B upsert).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertInput {
    pub metadata: Value,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    #[serde(rename = "schemaHash")]
    pub schema_hash: Option<String>,
    #[serde(rename = "expectedVersion")]
    pub expected_version: Option<i64>,
}

/// A field that can be explicitly set to a value, explicitly set to null,
/// or simply absent from the request payload. Needed because `owner` and
/// `schemaHash` distinguish "not present" (preserve) from "present and
/// null" (clear) in `patch` (`spec.md` §4.B).
#[derive(Debug, Clone, Default)]
pub enum Patchable<T> {
    #[default]
    Absent,
    Set(T),
    Clear,
}

impl<T> Patchable<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patchable::Absent)
    }
}

/// Tag patch algebra: `{set?, add?, remove?}` from `spec.md` §4.B.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TagPatch {
    pub set: Option<Vec<String>>,
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl TagPatch {
    pub fn is_empty(&self) -> bool {
        self.set.is_none() && self.add.is_empty() && self.remove.is_empty()
    }

    /// Apply this patch to an existing tag set, producing a normalised
    /// result. `set` replaces outright when non-empty; otherwise `remove`
    /// is applied before `add`.
    pub fn apply(&self, existing: &[String]) -> Result<Vec<String>, ValidationError> {
        if let Some(replacement) = &self.set {
            if !replacement.is_empty() {
                return normalize_tags(replacement.iter().cloned());
            }
        }
        let remove_set: BTreeSet<&str> = self.remove.iter().map(String::as_str).collect();
        let mut next: Vec<String> = existing
            .iter()
            .filter(|t| !remove_set.contains(t.as_str()))
            .cloned()
            .collect();
        next.extend(self.add.iter().cloned());
        normalize_tags(next)
    }
}

/// Partial update payload for `patch` (`spec.md` §4.B).
#[derive(Debug, Clone, Default)]
pub struct PatchInput {
    pub metadata: Option<Map<String, Value>>,
    pub metadata_unset: Vec<String>,
    pub tags: Option<TagPatch>,
    pub owner: Patchable<String>,
    pub schema_hash: Patchable<String>,
    pub expected_version: Option<i64>,
}

impl PatchInput {
    /// A patch must touch at least one of metadata, metadataUnset, tags,
    /// owner or schemaHash (`spec.md` §4.B).
    pub fn is_empty(&self) -> bool {
        self.metadata.is_none()
            && self.metadata_unset.is_empty()
            && self.tags.as_ref().map(TagPatch::is_empty).unwrap_or(true)
            && self.owner.is_absent()
            && self.schema_hash.is_absent()
    }
}

/// Deep-merge `patch` onto `base`, mutating `base` in place.
///
/// For each key in `patch`: if both the existing and incoming values are
/// objects, merge recursively; otherwise the patch value wins outright
/// (`spec.md` §4.B, §9). This is also used to prove the patch-composition
/// property in `spec.md` §8 item 3.
pub fn deep_merge(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, patch_value) in patch {
        match (base.get_mut(key), patch_value) {
            (Some(Value::Object(base_obj)), Value::Object(patch_obj)) => {
                deep_merge(base_obj, patch_obj);
            }
            _ => {
                base.insert(key.clone(), patch_value.clone());
            }
        }
    }
}

/// Remove a dotted path from a metadata object, pruning any intermediate
/// object left empty by the removal (`spec.md` §4.B).
pub fn unset_path(base: &mut Map<String, Value>, path: &str) {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    unset_segments(base, &segments);
}

fn unset_segments(base: &mut Map<String, Value>, segments: &[&str]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return base.remove(*head).is_some();
    }
    let Some(Value::Object(child)) = base.get_mut(*head) else {
        return false;
    };
    let removed = unset_segments(child, rest);
    if removed && child.is_empty() {
        base.remove(*head);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_and_dedupes_tags() {
        let tags = normalize_tags(vec![" beta ".into(), "beta".into(), "".into(), "pipelines".into()]).unwrap();
        assert_eq!(tags, vec!["beta".to_string(), "pipelines".to_string()]);
    }

    #[test]
    fn rejects_too_many_tags() {
        let tags: Vec<String> = (0..129).map(|i| format!("tag-{i}")).collect();
        assert!(matches!(normalize_tags(tags), Err(ValidationError::TooManyTags)));
    }

    #[test]
    fn deep_merge_overwrites_scalars_and_merges_objects() {
        let mut base = json!({"status": "active", "thresholds": {"latencyMs": 250, "errorRate": 1}})
            .as_object()
            .unwrap()
            .clone();
        let patch = json!({"status": "paused", "thresholds": {"latencyMs": 500}})
            .as_object()
            .unwrap()
            .clone();
        deep_merge(&mut base, &patch);
        assert_eq!(base["status"], json!("paused"));
        assert_eq!(base["thresholds"]["latencyMs"], json!(500));
        assert_eq!(base["thresholds"]["errorRate"], json!(1));
    }

    #[test]
    fn unset_prunes_empty_intermediate_objects() {
        let mut base = json!({"a": {"b": {"c": 1}}}).as_object().unwrap().clone();
        unset_path(&mut base, "a.b.c");
        assert_eq!(base, Map::new());
    }

    #[test]
    fn unset_keeps_siblings() {
        let mut base = json!({"a": {"b": 1, "c": 2}}).as_object().unwrap().clone();
        unset_path(&mut base, "a.b");
        assert_eq!(base["a"], json!({"c": 2}));
    }

    #[test]
    fn tag_patch_set_replaces_outright() {
        let patch = TagPatch {
            set: Some(vec!["x".into()]),
            add: vec!["y".into()],
            remove: vec![],
        };
        let result = patch.apply(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(result, vec!["x".to_string()]);
    }

    #[test]
    fn tag_patch_remove_then_add() {
        let patch = TagPatch {
            set: None,
            add: vec!["c".into()],
            remove: vec!["a".into()],
        };
        let result = patch
            .apply(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(result, vec!["b".to_string(), "c".to_string()]);
    }
}
