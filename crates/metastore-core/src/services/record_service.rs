//! Record service (`spec.md` §4.D) — the seam between HTTP and the
//! repository. Owns transaction shaping, idempotency reporting, restore
//! target resolution, and turning each committed mutation into a
//! [`PendingMutation`] that feeds the stream hub and bus publisher.

use std::sync::Arc;

use serde_json::json;

use crate::db::{MetastoreStore, RepositoryError};
use crate::events::{BulkMode, LazyBusPublisher, PendingMutation, StreamAction, StreamEvent, StreamHub};
use crate::filter::SearchRequest;
use crate::models::audit::AuditEntry;
use crate::models::record::{NewRecordInput, PatchInput, Record, UpsertInput, ValidationError};
use crate::models::token::{Identity, Scope};

use super::error::{from_repository, ServiceError};

/// Result of `create`/`upsert`: whether a new row was inserted, and
/// whether this call was a no-op repeat of a prior one.
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub record: Record,
    pub created: bool,
    pub idempotent: bool,
}

/// Result of `patch`/`softDelete`/`restore`: whether this call actually
/// changed the row.
#[derive(Debug, Clone)]
pub struct MutationResult {
    pub record: Record,
    pub mutated: bool,
    pub idempotent: bool,
}

#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub record: Record,
    pub previous: Record,
}

/// Exactly one of `audit_id`/`version` must be set (`spec.md` §4.D.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreTarget {
    pub audit_id: Option<i64>,
    pub version: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedBulkType {
    Upsert,
    Delete,
}

fn normalize_bulk_type(raw: Option<&str>) -> Option<ResolvedBulkType> {
    match raw.unwrap_or("upsert") {
        "upsert" | "put" | "create" => Some(ResolvedBulkType::Upsert),
        "delete" => Some(ResolvedBulkType::Delete),
        _ => None,
    }
}

/// One entry of a `POST /records/bulk` request body, already decoded.
#[derive(Debug, Clone)]
pub struct BulkOperationInput {
    pub operation_type: Option<String>,
    pub namespace: String,
    pub key: String,
    pub metadata: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
    pub owner: Option<String>,
    pub schema_hash: Option<String>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BulkError {
    pub status_code: u16,
    pub code: String,
    pub message: String,
}

impl BulkError {
    fn from_service(err: &ServiceError) -> Self {
        let status_code = match err.kind() {
            "bad_request" => 400,
            "not_found" => 404,
            "version_conflict" | "record_deleted" => 409,
            _ => 500,
        };
        BulkError {
            status_code,
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// One entry of a bulk response: either the successful mutation or an
/// error classified the way `spec.md` §4.D describes — `HttpError`-shaped
/// failures keep their status/code/message, anything else becomes
/// `internal_error`.
#[derive(Debug, Clone)]
pub struct BulkOperationOutcome {
    pub operation_type: &'static str,
    pub namespace: String,
    pub key: String,
    pub record: Option<Record>,
    pub created: Option<bool>,
    pub idempotent: Option<bool>,
    pub error: Option<BulkError>,
}

impl BulkOperationOutcome {
    fn ok(operation_type: &'static str, namespace: String, key: String, record: Record, created: Option<bool>, idempotent: Option<bool>) -> Self {
        BulkOperationOutcome {
            operation_type,
            namespace,
            key,
            record: Some(record),
            created,
            idempotent,
            error: None,
        }
    }

    fn err(operation_type: &'static str, namespace: String, key: String, err: &ServiceError) -> Self {
        BulkOperationOutcome {
            operation_type,
            namespace,
            key,
            record: None,
            created: None,
            idempotent: None,
            error: Some(BulkError::from_service(err)),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub struct RecordService {
    store: Arc<dyn MetastoreStore>,
    stream_hub: Arc<StreamHub>,
    bus: Arc<LazyBusPublisher>,
}

impl RecordService {
    pub fn new(store: Arc<dyn MetastoreStore>, stream_hub: Arc<StreamHub>, bus: Arc<LazyBusPublisher>) -> Self {
        RecordService { store, stream_hub, bus }
    }

    async fn emit(&self, mutation: PendingMutation) -> StreamEvent {
        let bus_payload = mutation.clone().into_bus_payload();
        let event = self.stream_hub.publish(mutation);
        self.bus.publish_best_effort(&bus_payload).await;
        event
    }

    /// `spec.md` §9 open question: a live existing record makes `create`
    /// a silent no-op; a soft-deleted existing record is a conflict.
    pub async fn create(&self, namespace: &str, key: &str, input: NewRecordInput, actor: Option<String>) -> Result<CreateResult, ServiceError> {
        let outcome = self
            .store
            .create_record(namespace, key, input, actor.clone())
            .await
            .map_err(|err| from_repository(namespace, key, err))?;

        if outcome.created {
            self.emit(PendingMutation {
                action: StreamAction::Created,
                record: outcome.record.clone(),
                actor,
                mode: None,
                restored_from: None,
            })
            .await;
            return Ok(CreateResult { record: outcome.record, created: true, idempotent: false });
        }

        if outcome.record.is_deleted() {
            return Err(ServiceError::RecordDeleted { namespace: namespace.to_string(), key: key.to_string() });
        }

        Ok(CreateResult { record: outcome.record, created: false, idempotent: true })
    }

    pub async fn upsert(&self, namespace: &str, key: &str, input: UpsertInput, actor: Option<String>) -> Result<CreateResult, ServiceError> {
        let outcome = self
            .store
            .upsert_record(namespace, key, input, actor.clone())
            .await
            .map_err(|err| from_repository(namespace, key, err))?;

        let action = if outcome.created { StreamAction::Created } else { StreamAction::Updated };
        self.emit(PendingMutation {
            action,
            record: outcome.record.clone(),
            actor,
            mode: None,
            restored_from: None,
        })
        .await;

        Ok(CreateResult { record: outcome.record, created: outcome.created, idempotent: false })
    }

    pub async fn patch(&self, namespace: &str, key: &str, patch: PatchInput, actor: Option<String>) -> Result<MutationResult, ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::Validation(ValidationError::EmptyPatch));
        }
        let expected_version = patch.expected_version;
        let outcome = self
            .store
            .patch_record(namespace, key, patch, expected_version, actor.clone())
            .await
            .map_err(|err| from_repository(namespace, key, err))?;

        self.emit(PendingMutation {
            action: StreamAction::Updated,
            record: outcome.record.clone(),
            actor,
            mode: None,
            restored_from: None,
        })
        .await;

        Ok(MutationResult { record: outcome.record, mutated: true, idempotent: false })
    }

    pub async fn soft_delete(&self, namespace: &str, key: &str, expected_version: Option<i64>, actor: Option<String>) -> Result<MutationResult, ServiceError> {
        let outcome = self
            .store
            .soft_delete_record(namespace, key, expected_version, actor.clone())
            .await
            .map_err(|err| from_repository(namespace, key, err))?;

        if outcome.mutated {
            self.emit(PendingMutation {
                action: StreamAction::Deleted,
                record: outcome.record.clone(),
                actor,
                mode: None,
                restored_from: None,
            })
            .await;
        }

        Ok(MutationResult { record: outcome.record, mutated: outcome.mutated, idempotent: !outcome.mutated })
    }

    /// No audit entry and no stream event for a purge (`spec.md` §4.B) —
    /// it erases history rather than recording a mutation of it.
    pub async fn hard_delete(&self, namespace: &str, key: &str, expected_version: Option<i64>) -> Result<Record, ServiceError> {
        let outcome = self
            .store
            .hard_delete_record(namespace, key, expected_version)
            .await
            .map_err(|err| from_repository(namespace, key, err))?;
        Ok(outcome.previous)
    }

    pub async fn restore(
        &self,
        namespace: &str,
        key: &str,
        target: RestoreTarget,
        expected_version: Option<i64>,
        actor: Option<String>,
    ) -> Result<RestoreResult, ServiceError> {
        let snapshot = self.resolve_restore_snapshot(namespace, key, target).await?;

        let outcome = self
            .store
            .restore_record(namespace, key, &snapshot, expected_version, actor.clone())
            .await
            .map_err(|err| from_repository(namespace, key, err))?;

        self.emit(PendingMutation {
            action: StreamAction::Updated,
            record: outcome.record.clone(),
            actor,
            mode: None,
            restored_from: Some(snapshot.version),
        })
        .await;

        Ok(RestoreResult { record: outcome.record, previous: outcome.previous })
    }

    async fn resolve_restore_snapshot(&self, namespace: &str, key: &str, target: RestoreTarget) -> Result<AuditEntry, ServiceError> {
        match (target.audit_id, target.version) {
            (Some(audit_id), None) => self
                .store
                .get_audit_by_id(namespace, key, audit_id)
                .await
                .map_err(|err| from_repository(namespace, key, err))?
                .ok_or_else(|| ServiceError::audit_not_found(namespace, key, audit_id.to_string())),
            (None, Some(version)) => self
                .store
                .get_audit_by_version(namespace, key, version)
                .await
                .map_err(|err| from_repository(namespace, key, err))?
                .ok_or_else(|| ServiceError::audit_not_found(namespace, key, version.to_string())),
            _ => Err(ServiceError::AmbiguousRestoreTarget),
        }
    }

    pub async fn fetch(&self, namespace: &str, key: &str, include_deleted: bool) -> Result<Record, ServiceError> {
        self.store
            .fetch_record(namespace, key, include_deleted)
            .await
            .map_err(|err| from_repository(namespace, key, err))?
            .ok_or_else(|| ServiceError::not_found(namespace, key))
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<crate::db::SearchResult, ServiceError> {
        request.validate()?;
        self.store.search_records(request).await.map_err(|err| match err {
            RepositoryError::Filter(filter_err) => ServiceError::Filter(filter_err),
            other => ServiceError::Repository(other),
        })
    }

    /// `spec.md` §4.D.1/§4.D.6 — bulk normalisation, scope enforcement,
    /// and per-mode event emission. Atomic mode fails the whole batch
    /// (emitting nothing) if any operation fails; `continueOnError`
    /// commits and emits each operation independently.
    pub async fn bulk(
        &self,
        operations: Vec<BulkOperationInput>,
        mode: BulkMode,
        identity: &Identity,
        actor: Option<String>,
    ) -> Result<Vec<BulkOperationOutcome>, ServiceError> {
        let mut outcomes = Vec::with_capacity(operations.len());
        let mut pending = Vec::with_capacity(operations.len());

        for (index, op) in operations.into_iter().enumerate() {
            let resolved = normalize_bulk_type(op.operation_type.as_deref())
                .ok_or_else(|| ServiceError::invalid_bulk_operation(index, "type must be one of upsert, put, create, delete"))?;

            if resolved == ResolvedBulkType::Delete && !identity.has_scope(Scope::Delete) {
                return Err(ServiceError::invalid_bulk_operation(index, "delete requires metastore:delete scope"));
            }

            let (outcome, mutation, service_err) = self.apply_bulk_operation(resolved, op, mode, actor.clone()).await;

            if let Some(err) = service_err {
                if matches!(mode, BulkMode::Atomic) {
                    return Err(err);
                }
                outcomes.push(outcome);
                continue;
            }

            if let Some(mutation) = mutation {
                match mode {
                    BulkMode::ContinueOnError => {
                        self.emit(mutation).await;
                    }
                    BulkMode::Atomic => pending.push(mutation),
                }
            }
            outcomes.push(outcome);
        }

        for mutation in pending {
            self.emit(mutation).await;
        }

        Ok(outcomes)
    }

    async fn apply_bulk_operation(
        &self,
        resolved: ResolvedBulkType,
        op: BulkOperationInput,
        mode: BulkMode,
        actor: Option<String>,
    ) -> (BulkOperationOutcome, Option<PendingMutation>, Option<ServiceError>) {
        match resolved {
            ResolvedBulkType::Upsert => {
                let input = UpsertInput {
                    metadata: op.metadata.unwrap_or_else(|| json!({})),
                    tags: op.tags.unwrap_or_default(),
                    owner: op.owner,
                    schema_hash: op.schema_hash,
                    expected_version: op.expected_version,
                };
                match self.store.upsert_record(&op.namespace, &op.key, input, actor.clone()).await {
                    Ok(outcome) => {
                        let action = if outcome.created { StreamAction::Created } else { StreamAction::Updated };
                        let mutation = PendingMutation {
                            action,
                            record: outcome.record.clone(),
                            actor,
                            mode: Some(mode),
                            restored_from: None,
                        };
                        let result = BulkOperationOutcome::ok(
                            "upsert",
                            op.namespace,
                            op.key,
                            outcome.record,
                            Some(outcome.created),
                            Some(false),
                        );
                        (result, Some(mutation), None)
                    }
                    Err(err) => {
                        let service_err = from_repository(&op.namespace, &op.key, err);
                        let result = BulkOperationOutcome::err("upsert", op.namespace.clone(), op.key.clone(), &service_err);
                        (result, None, Some(service_err))
                    }
                }
            }
            ResolvedBulkType::Delete => {
                match self
                    .store
                    .soft_delete_record(&op.namespace, &op.key, op.expected_version, actor.clone())
                    .await
                {
                    Ok(outcome) => {
                        let mutation = outcome.mutated.then(|| PendingMutation {
                            action: StreamAction::Deleted,
                            record: outcome.record.clone(),
                            actor,
                            mode: Some(mode),
                            restored_from: None,
                        });
                        let result = BulkOperationOutcome::ok(
                            "delete",
                            op.namespace,
                            op.key,
                            outcome.record,
                            None,
                            Some(!outcome.mutated),
                        );
                        (result, mutation, None)
                    }
                    Err(err) => {
                        let service_err = from_repository(&op.namespace, &op.key, err);
                        let result = BulkOperationOutcome::err("delete", op.namespace.clone(), op.key.clone(), &service_err);
                        (result, None, Some(service_err))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::events::NullBusPublisher;
    use crate::models::token::NamespaceScope;
    use serde_json::json;

    fn service() -> RecordService {
        let store: Arc<dyn MetastoreStore> = Arc::new(InMemoryStore::new());
        let hub = StreamHub::new();
        let bus = Arc::new(LazyBusPublisher::new(|| async { Ok(Arc::new(NullBusPublisher) as Arc<dyn crate::events::BusPublisher>) }));
        RecordService::new(store, hub, bus)
    }

    fn admin_identity() -> Identity {
        Identity {
            subject: "svc".into(),
            kind: crate::models::token::TokenKind::Service,
            scopes: [Scope::Admin].into_iter().collect(),
            namespaces: NamespaceScope::All,
        }
    }

    #[tokio::test]
    async fn second_create_is_idempotent_when_existing_record_is_live() {
        let svc = service();
        let input = NewRecordInput { metadata: json!({"status": "active"}), tags: vec![], owner: None, schema_hash: None };
        let first = svc.create("analytics", "pipeline-1", input.clone(), None).await.unwrap();
        assert!(first.created);
        assert!(!first.idempotent);

        let second = svc.create("analytics", "pipeline-1", input, None).await.unwrap();
        assert!(!second.created);
        assert!(second.idempotent);
    }

    #[tokio::test]
    async fn create_on_soft_deleted_existing_is_a_conflict() {
        let svc = service();
        let input = NewRecordInput::default();
        svc.create("analytics", "pipeline-1", input.clone(), None).await.unwrap();
        svc.soft_delete("analytics", "pipeline-1", None, None).await.unwrap();

        let err = svc.create("analytics", "pipeline-1", input, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::RecordDeleted { .. }));
    }

    #[tokio::test]
    async fn restore_requires_exactly_one_of_audit_id_or_version() {
        let svc = service();
        let err = svc
            .restore("analytics", "pipeline-1", RestoreTarget::default(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AmbiguousRestoreTarget));

        let err = svc
            .restore(
                "analytics",
                "pipeline-1",
                RestoreTarget { audit_id: Some(1), version: Some(1) },
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AmbiguousRestoreTarget));
    }

    #[tokio::test]
    async fn bulk_delete_without_scope_is_rejected() {
        let svc = service();
        let identity = Identity {
            subject: "svc".into(),
            kind: crate::models::token::TokenKind::Service,
            scopes: [Scope::Write].into_iter().collect(),
            namespaces: NamespaceScope::All,
        };
        let ops = vec![BulkOperationInput {
            operation_type: Some("delete".to_string()),
            namespace: "analytics".to_string(),
            key: "pipeline-1".to_string(),
            metadata: None,
            tags: None,
            owner: None,
            schema_hash: None,
            expected_version: None,
        }];
        let err = svc.bulk(ops, BulkMode::Atomic, &identity, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidBulkOperation { .. }));
    }

    #[tokio::test]
    async fn bulk_continue_on_error_reports_failures_without_aborting() {
        let svc = service();
        let ops = vec![
            BulkOperationInput {
                operation_type: None,
                namespace: "analytics".to_string(),
                key: "pipeline-1".to_string(),
                metadata: Some(json!({"status": "retired"})),
                tags: Some(vec!["pipelines".to_string()]),
                owner: None,
                schema_hash: None,
                expected_version: None,
            },
            BulkOperationInput {
                operation_type: Some("delete".to_string()),
                namespace: "analytics".to_string(),
                key: "does-not-exist".to_string(),
                metadata: None,
                tags: None,
                owner: None,
                schema_hash: None,
                expected_version: Some(5),
            },
        ];
        let results = svc
            .bulk(ops, BulkMode::ContinueOnError, &admin_identity(), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(!results[0].is_error());
        assert!(results[1].is_error());
    }
}
