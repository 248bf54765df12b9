//! Filestore reconciliation consumer (`spec.md` §4.G).
//!
//! Transport-agnostic by design: events arrive through [`submit`], so an
//! inline/test caller and a redis-pub/sub-backed dispatcher in
//! `metastore-server` use the exact same path. A single background task
//! drains the queue strictly in order — `spec.md` §5 calls for "at most
//! one event handler executes at a time per process" — so a slow or
//! failing event never skips or reorders the next one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::db::{MetastoreStore, RepositoryError};
use crate::models::record::{NewRecordInput, PatchInput, Patchable};

use super::error::ConsumerError;
use super::health::HealthTracker;
use super::mapping::{map_event, MappedAction};

const QUEUE_CAPACITY: usize = 1024;
const SYSTEM_ACTOR: &str = "filestore-consumer";

/// One inbound event, already decoded from whatever wire format the
/// transport used.
#[derive(Debug, Clone)]
pub struct FilestoreEvent {
    pub event_type: String,
    pub node_id: Option<Value>,
    pub observed_at: DateTime<Utc>,
    pub payload: Value,
}

/// Owns the work queue and the background worker task. Dropping this
/// (after closing the sender) lets the worker drain whatever is left in
/// the queue before exiting (`spec.md` §9 — "shutdown drains the queue
/// before closing the transport").
pub struct FilestoreConsumer {
    sender: mpsc::Sender<FilestoreEvent>,
    health: Arc<HealthTracker>,
}

impl FilestoreConsumer {
    pub fn spawn(store: Arc<dyn MetastoreStore>, namespace: String, health: Arc<HealthTracker>) -> Self {
        let (sender, mut receiver) = mpsc::channel(QUEUE_CAPACITY);
        let worker_health = health.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                process_event(&store, &namespace, &worker_health, event).await;
            }
        });
        FilestoreConsumer { sender, health }
    }

    pub async fn submit(&self, event: FilestoreEvent) -> Result<(), ConsumerError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| ConsumerError::Closed)
    }

    pub fn health(&self) -> Arc<HealthTracker> {
        self.health.clone()
    }
}

async fn process_event(
    store: &Arc<dyn MetastoreStore>,
    namespace: &str,
    health: &HealthTracker,
    event: FilestoreEvent,
) {
    let outcome = match map_event(&event.event_type, event.node_id.as_ref(), &event.payload) {
        None => Ok(()),
        Some(MappedAction::Upsert { key, filestore_envelope }) => {
            apply_upsert(store, namespace, &key, filestore_envelope).await
        }
        Some(MappedAction::Delete { key }) => apply_delete(store, namespace, &key).await,
    };

    match outcome {
        Ok(()) => health.record_processed(event.observed_at),
        Err(err) => {
            tracing::warn!(
                namespace,
                event_type = %event.event_type,
                error = %err,
                "filestore event processing failed"
            );
            health.record_failure();
        }
    }
}

/// Merge `{filestore: envelope}` onto the record's metadata, preserving
/// unrelated metadata and tags (`spec.md` §4.G). Creates the record if it
/// doesn't exist yet.
async fn apply_upsert(
    store: &Arc<dyn MetastoreStore>,
    namespace: &str,
    key: &str,
    envelope: Map<String, Value>,
) -> Result<(), RepositoryError> {
    let mut patch_metadata = Map::new();
    patch_metadata.insert("filestore".to_string(), Value::Object(envelope.clone()));

    let patch = PatchInput {
        metadata: Some(patch_metadata),
        metadata_unset: vec![],
        tags: None,
        owner: Patchable::Absent,
        schema_hash: Patchable::Absent,
        expected_version: None,
    };

    match store
        .patch_record(namespace, key, patch, None, Some(SYSTEM_ACTOR.to_string()))
        .await
    {
        Ok(_) => Ok(()),
        Err(RepositoryError::NotFound { .. }) => {
            let mut metadata = Map::new();
            metadata.insert("filestore".to_string(), Value::Object(envelope));
            let input = NewRecordInput {
                metadata: Value::Object(metadata),
                tags: vec![],
                owner: None,
                schema_hash: None,
            };
            store
                .create_record(namespace, key, input, Some(SYSTEM_ACTOR.to_string()))
                .await
                .map(|_| ())
        }
        Err(other) => Err(other),
    }
}

async fn apply_delete(store: &Arc<dyn MetastoreStore>, namespace: &str, key: &str) -> Result<(), RepositoryError> {
    match store.soft_delete_record(namespace, key, None, Some(SYSTEM_ACTOR.to_string())).await {
        Ok(_) => Ok(()),
        Err(RepositoryError::NotFound { .. }) | Err(RepositoryError::RecordDeleted { .. }) => Ok(()),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn created_event_creates_record_with_filestore_metadata() {
        let store: Arc<dyn MetastoreStore> = Arc::new(InMemoryStore::new());
        let health = Arc::new(HealthTracker::new(true, true, Duration::from_secs(30)));
        let consumer = FilestoreConsumer::spawn(store.clone(), "filestore-sync".to_string(), health.clone());

        let payload = json!({
            "nodeId": 501,
            "path": "datasets/raw/sales",
            "backendMountId": 101,
            "state": "active",
            "version": 1,
        });
        consumer
            .submit(FilestoreEvent {
                event_type: "node.created".to_string(),
                node_id: payload.get("nodeId").cloned(),
                observed_at: Utc::now(),
                payload,
            })
            .await
            .unwrap();

        // Let the background worker run.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let record = store
            .fetch_record("filestore-sync", "501", true)
            .await
            .unwrap()
            .expect("record should exist");
        assert_eq!(record.metadata["filestore"]["path"], json!("datasets/raw/sales"));
    }

    #[tokio::test]
    async fn updated_event_preserves_out_of_band_tags() {
        let inner = Arc::new(InMemoryStore::new());
        let store: Arc<dyn MetastoreStore> = inner.clone();
        let health = Arc::new(HealthTracker::new(true, true, Duration::from_secs(30)));
        let consumer = FilestoreConsumer::spawn(store.clone(), "filestore-sync".to_string(), health);

        let created = json!({"nodeId": 501, "path": "datasets/raw/sales", "version": 1});
        consumer
            .submit(FilestoreEvent {
                event_type: "node.created".to_string(),
                node_id: created.get("nodeId").cloned(),
                observed_at: Utc::now(),
                payload: created,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        inner
            .patch_record(
                "filestore-sync",
                "501",
                PatchInput {
                    tags: Some(crate::models::record::TagPatch {
                        set: Some(vec!["gold".to_string()]),
                        add: vec![],
                        remove: vec![],
                    }),
                    ..Default::default()
                },
                None,
                Some("operator".to_string()),
            )
            .await
            .unwrap();

        let updated = json!({"nodeId": 501, "version": 2, "sizeBytes": 2048});
        consumer
            .submit(FilestoreEvent {
                event_type: "node.updated".to_string(),
                node_id: updated.get("nodeId").cloned(),
                observed_at: Utc::now(),
                payload: updated,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let record = inner.fetch_record("filestore-sync", "501", false).await.unwrap().unwrap();
        assert_eq!(record.tags, vec!["gold".to_string()]);
        assert_eq!(record.metadata["filestore"]["sizeBytes"], json!(2048));
    }

    #[tokio::test]
    async fn deleted_event_soft_deletes_record() {
        let inner = Arc::new(InMemoryStore::new());
        let store: Arc<dyn MetastoreStore> = inner.clone();
        let health = Arc::new(HealthTracker::new(true, true, Duration::from_secs(30)));
        let consumer = FilestoreConsumer::spawn(store.clone(), "filestore-sync".to_string(), health);

        let created = json!({"nodeId": 9, "path": "a"});
        consumer
            .submit(FilestoreEvent {
                event_type: "node.created".to_string(),
                node_id: created.get("nodeId").cloned(),
                observed_at: Utc::now(),
                payload: created,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let deleted = json!({"nodeId": 9});
        consumer
            .submit(FilestoreEvent {
                event_type: "node.deleted".to_string(),
                node_id: deleted.get("nodeId").cloned(),
                observed_at: Utc::now(),
                payload: deleted,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let record = inner.fetch_record("filestore-sync", "9", true).await.unwrap().unwrap();
        assert!(record.is_deleted());
    }

    #[tokio::test]
    async fn event_without_node_id_is_ignored_without_failing_health() {
        let store: Arc<dyn MetastoreStore> = Arc::new(InMemoryStore::new());
        let health = Arc::new(HealthTracker::new(true, true, Duration::from_secs(30)));
        let consumer = FilestoreConsumer::spawn(store, "filestore-sync".to_string(), health.clone());

        consumer
            .submit(FilestoreEvent {
                event_type: "node.created".to_string(),
                node_id: None,
                observed_at: Utc::now(),
                payload: json!({}),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(health.snapshot(Utc::now()).processing_failures, 0);
    }
}
