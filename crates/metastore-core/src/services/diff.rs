//! Audit diff computation (`spec.md` §4.C, §4.J).
//!
//! Computed out of band from a chosen audit entry's before/after
//! snapshot — never persisted. Object keys use dotted notation, array
//! indices render as `[i]`, and every path list is sorted
//! lexicographically so the diff is stable regardless of map iteration
//! order.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::models::audit::{AuditDiff, AuditEntry, AuditSnapshotView, ChangedPath, MetadataDiff, ScalarDiff, TagDiff};

/// Build the structured diff the audit diff endpoint returns for one
/// entry: `previousMetadata`/`previousTags`/... against the entry's own
/// `metadata`/`tags`/....
pub fn diff_entry(entry: &AuditEntry) -> AuditDiff {
    AuditDiff {
        metadata: diff_metadata(&entry.previous_metadata, &entry.metadata),
        tags: diff_tags(&entry.previous_tags, &entry.tags),
        owner: diff_scalar(
            entry.previous_owner.as_deref().map(Value::from),
            entry.owner.as_deref().map(Value::from),
        ),
        schema_hash: diff_scalar(
            entry.previous_schema_hash.as_deref().map(Value::from),
            entry.schema_hash.as_deref().map(Value::from),
        ),
        previous: AuditSnapshotView {
            metadata: entry.previous_metadata.clone(),
            tags: entry.previous_tags.clone(),
            owner: entry.previous_owner.clone(),
            schema_hash: entry.previous_schema_hash.clone(),
        },
        current: AuditSnapshotView {
            metadata: entry.metadata.clone(),
            tags: entry.tags.clone(),
            owner: entry.owner.clone(),
            schema_hash: entry.schema_hash.clone(),
        },
    }
}

fn diff_scalar(before: Option<Value>, after: Option<Value>) -> ScalarDiff {
    let before = before.unwrap_or(Value::Null);
    let after = after.unwrap_or(Value::Null);
    let changed = before != after;
    ScalarDiff { before, after, changed }
}

fn diff_tags(before: &[String], after: &[String]) -> TagDiff {
    let before_set: BTreeSet<&str> = before.iter().map(String::as_str).collect();
    let after_set: BTreeSet<&str> = after.iter().map(String::as_str).collect();
    TagDiff {
        added: after_set.difference(&before_set).map(|s| s.to_string()).collect(),
        removed: before_set.difference(&after_set).map(|s| s.to_string()).collect(),
    }
}

fn diff_metadata(before: &Value, after: &Value) -> MetadataDiff {
    let empty = Map::new();
    let before_obj = before.as_object().unwrap_or(&empty);
    let after_obj = after.as_object().unwrap_or(&empty);

    let mut diff = MetadataDiff::default();
    walk(before_obj, after_obj, "", &mut diff);
    diff.added.sort();
    diff.removed.sort();
    diff.changed.sort_by(|a, b| a.path.cmp(&b.path));
    diff
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn walk(before: &Map<String, Value>, after: &Map<String, Value>, prefix: &str, diff: &mut MetadataDiff) {
    for (key, after_value) in after {
        let path = join(prefix, key);
        match before.get(key) {
            None => record_added(after_value, &path, diff),
            Some(before_value) => compare_value(before_value, after_value, &path, diff),
        }
    }
    for (key, before_value) in before {
        if !after.contains_key(key) {
            let path = join(prefix, key);
            record_removed(before_value, &path, diff);
        }
    }
}

fn compare_value(before: &Value, after: &Value, path: &str, diff: &mut MetadataDiff) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => walk(b, a, path, diff),
        (Value::Array(b), Value::Array(a)) => compare_array(b, a, path, diff),
        _ if before == after => {}
        _ => diff.changed.push(ChangedPath {
            path: path.to_string(),
            before: before.clone(),
            after: after.clone(),
        }),
    }
}

fn compare_array(before: &[Value], after: &[Value], path: &str, diff: &mut MetadataDiff) {
    let max = before.len().max(after.len());
    for i in 0..max {
        let indexed = format!("{path}[{i}]");
        match (before.get(i), after.get(i)) {
            (Some(b), Some(a)) => compare_value(b, a, &indexed, diff),
            (None, Some(a)) => record_added(a, &indexed, diff),
            (Some(b), None) => record_removed(b, &indexed, diff),
            (None, None) => unreachable!("index bounded by max(before.len(), after.len())"),
        }
    }
}

fn record_added(value: &Value, path: &str, diff: &mut MetadataDiff) {
    match value {
        Value::Object(obj) if !obj.is_empty() => walk(&Map::new(), obj, path, diff),
        _ => diff.added.push(path.to_string()),
    }
}

fn record_removed(value: &Value, path: &str, diff: &mut MetadataDiff) {
    match value {
        Value::Object(obj) if !obj.is_empty() => walk(obj, &Map::new(), path, diff),
        _ => diff.removed.push(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::AuditAction;
    use chrono::Utc;
    use serde_json::json;

    fn entry(previous_metadata: Value, metadata: Value, previous_tags: Vec<&str>, tags: Vec<&str>) -> AuditEntry {
        AuditEntry {
            id: 1,
            namespace: "analytics".into(),
            key: "pipeline-1".into(),
            action: AuditAction::Update,
            actor: None,
            previous_version: Some(1),
            version: 2,
            metadata,
            previous_metadata,
            tags: tags.into_iter().map(String::from).collect(),
            previous_tags: previous_tags.into_iter().map(String::from).collect(),
            owner: None,
            previous_owner: None,
            schema_hash: None,
            previous_schema_hash: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn detects_added_removed_and_changed_scalar_paths() {
        let before = json!({"status": "active", "region": "us"});
        let after = json!({"status": "paused", "tier": "gold"});
        let diff = diff_metadata(&before, &after);
        assert_eq!(diff.added, vec!["tier".to_string()]);
        assert_eq!(diff.removed, vec!["region".to_string()]);
        assert_eq!(
            diff.changed,
            vec![ChangedPath {
                path: "status".into(),
                before: json!("active"),
                after: json!("paused"),
            }]
        );
    }

    #[test]
    fn nested_object_changes_use_dotted_paths() {
        let before = json!({"thresholds": {"latencyMs": 250, "errorRate": 1}});
        let after = json!({"thresholds": {"latencyMs": 500, "errorRate": 1}});
        let diff = diff_metadata(&before, &after);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].path, "thresholds.latencyMs");
    }

    #[test]
    fn array_index_changes_use_bracket_notation() {
        let before = json!({"items": ["a", "b"]});
        let after = json!({"items": ["a", "c", "d"]});
        let diff = diff_metadata(&before, &after);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].path, "items[1]");
        assert_eq!(diff.added, vec!["items[2]".to_string()]);
    }

    #[test]
    fn tags_diff_reports_additions_and_removals() {
        let diff = diff_tags(&["a".to_string(), "b".to_string()], &["b".to_string(), "c".to_string()]);
        assert_eq!(diff.added, vec!["c".to_string()]);
        assert_eq!(diff.removed, vec!["a".to_string()]);
    }

    #[test]
    fn diff_entry_composes_every_section() {
        let entry = entry(
            json!({"status": "active"}),
            json!({"status": "paused"}),
            vec!["beta"],
            vec!["beta", "gold"],
        );
        let diff = diff_entry(&entry);
        assert_eq!(diff.metadata.changed[0].path, "status");
        assert_eq!(diff.tags.added, vec!["gold".to_string()]);
        assert!(!diff.owner.changed);
    }
}
