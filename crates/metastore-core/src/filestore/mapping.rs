//! External-event-to-record-mutation mapping (`spec.md` §4.G).

use serde_json::{Map, Value};

/// Fields copied verbatim from the inbound event payload into
/// `metadata.filestore` when present (`spec.md` §4.G).
const ENVELOPE_FIELDS: &[&str] = &[
    "backendMountId",
    "path",
    "kind",
    "state",
    "parentId",
    "version",
    "sizeBytes",
    "checksum",
    "contentHash",
    "nodeMetadata",
    "observedAt",
    "journalId",
    "command",
    "idempotencyKey",
    "principal",
    "consistencyState",
    "consistencyCheckedAt",
    "lastReconciledAt",
    "reconciliationReason",
    "previousState",
];

/// The record-level mutation a filestore event resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedAction {
    Upsert {
        key: String,
        filestore_envelope: Map<String, Value>,
    },
    Delete {
        key: String,
    },
}

fn node_id_to_key(node_id: &Value) -> Option<String> {
    match node_id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map one filestore event into a [`MappedAction`], or `None` when the
/// event carries no `nodeId` or isn't a recognised type (`spec.md` §4.G —
/// "events without a nodeId are ignored").
pub fn map_event(event_type: &str, node_id: Option<&Value>, payload: &Value) -> Option<MappedAction> {
    let key = node_id_to_key(node_id?)?;
    let kind = event_type.strip_prefix("filestore.").unwrap_or(event_type);
    match kind {
        "node.created" | "node.updated" | "node.reconciled" | "node.missing" => {
            let mut envelope = Map::new();
            if let Some(obj) = payload.as_object() {
                for field in ENVELOPE_FIELDS {
                    if let Some(value) = obj.get(*field) {
                        envelope.insert((*field).to_string(), value.clone());
                    }
                }
            }
            if !envelope.contains_key("consistencyState") {
                if let Some(state) = envelope.get("state").cloned() {
                    envelope.insert("consistencyState".to_string(), state);
                }
            }
            Some(MappedAction::Upsert {
                key,
                filestore_envelope: envelope,
            })
        }
        "node.deleted" => Some(MappedAction::Delete { key }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_node_id_is_ignored() {
        let payload = json!({"path": "datasets/raw"});
        assert!(map_event("node.created", None, &payload).is_none());
    }

    #[test]
    fn created_event_copies_envelope_fields() {
        let payload = json!({
            "nodeId": 501,
            "path": "datasets/raw/sales",
            "backendMountId": 101,
            "state": "active",
            "version": 1,
        });
        let node_id = payload.get("nodeId").unwrap();
        let action = map_event("node.created", Some(node_id), &payload).unwrap();
        match action {
            MappedAction::Upsert { key, filestore_envelope } => {
                assert_eq!(key, "501");
                assert_eq!(filestore_envelope["path"], json!("datasets/raw/sales"));
                assert_eq!(filestore_envelope["consistencyState"], json!("active"));
            }
            MappedAction::Delete { .. } => panic!("expected upsert"),
        }
    }

    #[test]
    fn reconciled_event_keeps_explicit_consistency_state_and_reason() {
        let payload = json!({
            "nodeId": 501,
            "state": "active",
            "consistencyState": "inconsistent",
            "reconciliationReason": "checksum-mismatch",
        });
        let node_id = payload.get("nodeId").unwrap();
        let action = map_event("node.reconciled", Some(node_id), &payload).unwrap();
        match action {
            MappedAction::Upsert { filestore_envelope, .. } => {
                assert_eq!(filestore_envelope["consistencyState"], json!("inconsistent"));
                assert_eq!(filestore_envelope["reconciliationReason"], json!("checksum-mismatch"));
            }
            MappedAction::Delete { .. } => panic!("expected upsert"),
        }
    }

    #[test]
    fn deleted_event_maps_to_delete() {
        let payload = json!({"nodeId": 501});
        let node_id = payload.get("nodeId").unwrap();
        let action = map_event("node.deleted", Some(node_id), &payload).unwrap();
        assert_eq!(action, MappedAction::Delete { key: "501".to_string() });
    }

    #[test]
    fn unrecognised_event_type_is_ignored() {
        let payload = json!({"nodeId": 501});
        let node_id = payload.get("nodeId").unwrap();
        assert!(map_event("node.renamed", Some(node_id), &payload).is_none());
    }
}
