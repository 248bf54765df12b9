//! In-memory [`MetastoreStore`] test double.
//!
//! Mirrors [`super::postgres::PgStore`]'s transactional semantics without
//! a live connection, so the service layer (`spec.md` §4.D) can be
//! exercised with `tokio::test` in this workspace, which is built
//! without a `DATABASE_URL`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::filter::{evaluate, SearchRequest};
use crate::models::audit::{AuditAction, AuditEntry};
use crate::models::record::{
    deep_merge, normalize_tags, unset_path, NewRecordInput, PatchInput, Patchable, Record,
    UpsertInput,
};
use crate::models::schema::{SchemaDefinition, SchemaRegistration};
use crate::models::token::NamespaceScope;

use super::error::RepositoryError;
use super::store::MetastoreStore;
use super::types::{
    CreateOutcome, HardDeleteOutcome, NamespaceStats, OwnerCount, PatchOutcome, RestoreOutcome,
    SearchResult, SoftDeleteOutcome, UpsertOutcome,
};

type RecordKey = (String, String);

#[derive(Default)]
struct State {
    records: HashMap<RecordKey, Record>,
    audits: Vec<AuditEntry>,
    schemas: HashMap<String, SchemaDefinition>,
    next_audit_id: i64,
}

/// An in-memory stand-in for [`super::postgres::PgStore`]. A single
/// `tokio::sync::Mutex` guards all state, which is the single-threaded
/// equivalent of the row lock the Postgres backend takes per key.
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_expected_version(expected: Option<i64>, actual: i64) -> Result<(), RepositoryError> {
    match expected {
        Some(v) if v != actual => Err(RepositoryError::optimistic_lock(v, actual)),
        _ => Ok(()),
    }
}

fn push_audit(
    state: &mut State,
    namespace: &str,
    key: &str,
    action: AuditAction,
    actor: Option<&str>,
    previous: Option<&Record>,
    current: &Record,
) {
    state.next_audit_id += 1;
    state.audits.push(AuditEntry {
        id: state.next_audit_id,
        namespace: namespace.to_string(),
        key: key.to_string(),
        action,
        actor: actor.map(str::to_string),
        previous_version: previous.map(|p| p.version),
        version: current.version,
        metadata: current.metadata.clone(),
        previous_metadata: previous.map(|p| p.metadata.clone()).unwrap_or(Value::Null),
        tags: current.tags.clone(),
        previous_tags: previous.map(|p| p.tags.clone()).unwrap_or_default(),
        owner: current.owner.clone(),
        previous_owner: previous.and_then(|p| p.owner.clone()),
        schema_hash: current.schema_hash.clone(),
        previous_schema_hash: previous.and_then(|p| p.schema_hash.clone()),
        created_at: Utc::now(),
    });
}

#[async_trait]
impl MetastoreStore for InMemoryStore {
    async fn create_record(
        &self,
        namespace: &str,
        key: &str,
        input: NewRecordInput,
        actor: Option<String>,
    ) -> Result<CreateOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let rk = (namespace.to_string(), key.to_string());
        if let Some(existing) = state.records.get(&rk) {
            return Ok(CreateOutcome {
                record: existing.clone(),
                created: false,
            });
        }
        let tags = normalize_tags(input.tags.into_iter())
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let now = Utc::now();
        let record = Record {
            namespace: namespace.to_string(),
            key: key.to_string(),
            metadata: input.metadata,
            tags,
            owner: input.owner,
            schema_hash: input.schema_hash,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: actor.clone(),
            updated_by: actor.clone(),
        };
        push_audit(&mut state, namespace, key, AuditAction::Create, actor.as_deref(), None, &record);
        state.records.insert(rk, record.clone());
        Ok(CreateOutcome {
            record,
            created: true,
        })
    }

    async fn upsert_record(
        &self,
        namespace: &str,
        key: &str,
        input: UpsertInput,
        actor: Option<String>,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let rk = (namespace.to_string(), key.to_string());
        let tags = normalize_tags(input.tags.into_iter())
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        let Some(existing) = state.records.get(&rk).cloned() else {
            let now = Utc::now();
            let record = Record {
                namespace: namespace.to_string(),
                key: key.to_string(),
                metadata: input.metadata,
                tags,
                owner: input.owner,
                schema_hash: input.schema_hash,
                version: 1,
                created_at: now,
                updated_at: now,
                deleted_at: None,
                created_by: actor.clone(),
                updated_by: actor.clone(),
            };
            push_audit(&mut state, namespace, key, AuditAction::Create, actor.as_deref(), None, &record);
            state.records.insert(rk, record.clone());
            return Ok(UpsertOutcome {
                record,
                previous: None,
                created: true,
            });
        };

        check_expected_version(input.expected_version, existing.version)?;
        let mut updated = existing.clone();
        updated.metadata = input.metadata;
        updated.tags = tags;
        updated.owner = input.owner;
        updated.schema_hash = input.schema_hash;
        updated.updated_at = Utc::now();
        updated.updated_by = actor.clone();
        updated.version += 1;
        updated.deleted_at = None;

        push_audit(&mut state, namespace, key, AuditAction::Update, actor.as_deref(), Some(&existing), &updated);
        state.records.insert(rk, updated.clone());
        Ok(UpsertOutcome {
            record: updated,
            previous: Some(existing),
            created: false,
        })
    }

    async fn patch_record(
        &self,
        namespace: &str,
        key: &str,
        patch: PatchInput,
        expected_version: Option<i64>,
        actor: Option<String>,
    ) -> Result<PatchOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let rk = (namespace.to_string(), key.to_string());
        let existing = state
            .records
            .get(&rk)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(namespace, key))?;
        if existing.is_deleted() {
            return Err(RepositoryError::record_deleted(namespace, key));
        }
        check_expected_version(expected_version, existing.version)?;

        let mut metadata = existing.metadata.as_object().cloned().unwrap_or_default();
        if let Some(patch_obj) = &patch.metadata {
            deep_merge(&mut metadata, patch_obj);
        }
        for path in &patch.metadata_unset {
            unset_path(&mut metadata, path);
        }
        let tags = match &patch.tags {
            Some(tag_patch) => tag_patch
                .apply(&existing.tags)
                .map_err(|e| RepositoryError::Corrupt(e.to_string()))?,
            None => existing.tags.clone(),
        };
        let owner = match &patch.owner {
            Patchable::Absent => existing.owner.clone(),
            Patchable::Set(v) => Some(v.clone()),
            Patchable::Clear => None,
        };
        let schema_hash = match &patch.schema_hash {
            Patchable::Absent => existing.schema_hash.clone(),
            Patchable::Set(v) => Some(v.clone()),
            Patchable::Clear => None,
        };

        let mut updated = existing.clone();
        updated.metadata = Value::Object(metadata);
        updated.tags = tags;
        updated.owner = owner;
        updated.schema_hash = schema_hash;
        updated.updated_at = Utc::now();
        updated.updated_by = actor.clone();
        updated.version += 1;

        push_audit(&mut state, namespace, key, AuditAction::Update, actor.as_deref(), Some(&existing), &updated);
        state.records.insert(rk, updated.clone());
        Ok(PatchOutcome {
            record: updated,
            previous: existing,
        })
    }

    async fn soft_delete_record(
        &self,
        namespace: &str,
        key: &str,
        expected_version: Option<i64>,
        actor: Option<String>,
    ) -> Result<SoftDeleteOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let rk = (namespace.to_string(), key.to_string());
        let existing = state
            .records
            .get(&rk)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(namespace, key))?;
        if existing.is_deleted() {
            return Ok(SoftDeleteOutcome {
                record: existing,
                mutated: false,
            });
        }
        check_expected_version(expected_version, existing.version)?;

        let mut updated = existing.clone();
        updated.deleted_at = Some(Utc::now());
        updated.updated_at = Utc::now();
        updated.updated_by = actor.clone();
        updated.version += 1;
        push_audit(&mut state, namespace, key, AuditAction::Delete, actor.as_deref(), Some(&existing), &updated);
        state.records.insert(rk, updated.clone());
        Ok(SoftDeleteOutcome {
            record: updated,
            mutated: true,
        })
    }

    async fn hard_delete_record(
        &self,
        namespace: &str,
        key: &str,
        expected_version: Option<i64>,
    ) -> Result<HardDeleteOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let rk = (namespace.to_string(), key.to_string());
        let existing = state
            .records
            .get(&rk)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(namespace, key))?;
        check_expected_version(expected_version, existing.version)?;
        state.records.remove(&rk);
        state
            .audits
            .retain(|a| !(a.namespace == namespace && a.key == key));
        Ok(HardDeleteOutcome { previous: existing })
    }

    async fn restore_record(
        &self,
        namespace: &str,
        key: &str,
        snapshot: &AuditEntry,
        expected_version: Option<i64>,
        actor: Option<String>,
    ) -> Result<RestoreOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let rk = (namespace.to_string(), key.to_string());
        let existing = state
            .records
            .get(&rk)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(namespace, key))?;
        check_expected_version(expected_version, existing.version)?;

        let tags = normalize_tags(snapshot.tags.iter().cloned())
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let mut updated = existing.clone();
        updated.metadata = snapshot.metadata.clone();
        updated.tags = tags;
        updated.owner = snapshot.owner.clone();
        updated.schema_hash = snapshot.schema_hash.clone();
        updated.deleted_at = None;
        updated.updated_at = Utc::now();
        updated.updated_by = actor.clone();
        updated.version += 1;

        push_audit(&mut state, namespace, key, AuditAction::Restore, actor.as_deref(), Some(&existing), &updated);
        state.records.insert(rk, updated.clone());
        Ok(RestoreOutcome {
            record: updated,
            previous: existing,
        })
    }

    async fn fetch_record(
        &self,
        namespace: &str,
        key: &str,
        include_deleted: bool,
    ) -> Result<Option<Record>, RepositoryError> {
        let state = self.state.lock().await;
        let rk = (namespace.to_string(), key.to_string());
        Ok(state
            .records
            .get(&rk)
            .filter(|r| include_deleted || !r.is_deleted())
            .cloned())
    }

    async fn search_records(&self, request: &SearchRequest) -> Result<SearchResult, RepositoryError> {
        let state = self.state.lock().await;
        let mut matches: Vec<Record> = state
            .records
            .values()
            .filter(|r| r.namespace == request.namespace)
            .filter(|r| request.include_deleted || !r.is_deleted())
            .filter(|r| match &request.filter {
                Some(tree) => evaluate(tree, r).unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();

        if request.sort.is_empty() {
            matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        } else {
            for sort in request.sort.iter().rev().take(5) {
                matches.sort_by(|a, b| {
                    let ord = compare_sort_field(a, b, &sort.field);
                    match sort.order {
                        crate::filter::SortOrder::Asc => ord,
                        crate::filter::SortOrder::Desc => ord.reverse(),
                    }
                });
            }
        }

        let total = matches.len() as i64;
        let offset: usize = request
            .pagination
            .cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let limit = request.pagination.clamped_limit() as usize;
        let records = matches.into_iter().skip(offset).take(limit).collect();
        Ok(SearchResult { records, total })
    }

    async fn list_audit(
        &self,
        namespace: &str,
        key: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditEntry>, i64), RepositoryError> {
        let state = self.state.lock().await;
        let mut entries: Vec<AuditEntry> = state
            .audits
            .iter()
            .filter(|a| a.namespace == namespace && a.key == key)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = entries.len() as i64;
        let page = entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn get_audit_by_id(
        &self,
        namespace: &str,
        key: &str,
        id: i64,
    ) -> Result<Option<AuditEntry>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .audits
            .iter()
            .find(|a| a.namespace == namespace && a.key == key && a.id == id)
            .cloned())
    }

    async fn get_audit_by_version(
        &self,
        namespace: &str,
        key: &str,
        version: i64,
    ) -> Result<Option<AuditEntry>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .audits
            .iter()
            .find(|a| a.namespace == namespace && a.key == key && a.version == version)
            .cloned())
    }

    async fn get_schema(&self, hash: &str) -> Result<Option<SchemaDefinition>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.schemas.get(hash).cloned())
    }

    async fn put_schema(
        &self,
        registration: SchemaRegistration,
    ) -> Result<SchemaDefinition, RepositoryError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created_at = state
            .schemas
            .get(&registration.schema_hash)
            .map(|s| s.created_at)
            .unwrap_or(now);
        let definition = SchemaDefinition {
            schema_hash: registration.schema_hash.clone(),
            name: registration.name,
            description: registration.description,
            version: registration.version,
            fields: registration.fields,
            metadata: registration.metadata,
            created_at,
            updated_at: now,
        };
        state
            .schemas
            .insert(registration.schema_hash, definition.clone());
        Ok(definition)
    }

    async fn namespace_stats(
        &self,
        scope: &NamespaceScope,
        prefix: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<NamespaceStats>, i64), RepositoryError> {
        if let NamespaceScope::Allowed(set) = scope {
            if set.is_empty() {
                return Ok((vec![], 0));
            }
        }
        let state = self.state.lock().await;
        let mut grouped: HashMap<String, Vec<&Record>> = HashMap::new();
        for record in state.records.values() {
            if !scope.allows(&record.namespace) {
                continue;
            }
            if let Some(p) = prefix {
                if !record.namespace.starts_with(p) {
                    continue;
                }
            }
            grouped.entry(record.namespace.clone()).or_default().push(record);
        }
        let mut namespaces: Vec<String> = grouped.keys().cloned().collect();
        namespaces.sort();
        let total = namespaces.len() as i64;

        let mut stats = Vec::new();
        for ns in namespaces.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize) {
            let records = &grouped[&ns];
            let total_records = records.len() as i64;
            let deleted_records = records.iter().filter(|r| r.is_deleted()).count() as i64;
            let last_updated_at = records.iter().map(|r| r.updated_at).max();
            let mut owner_tally: HashMap<String, i64> = HashMap::new();
            for r in records.iter().filter(|r| !r.is_deleted()) {
                if let Some(owner) = &r.owner {
                    *owner_tally.entry(owner.clone()).or_insert(0) += 1;
                }
            }
            let mut owner_counts: Vec<OwnerCount> = owner_tally
                .into_iter()
                .map(|(owner, count)| OwnerCount { owner, count })
                .collect();
            owner_counts.sort_by(|a, b| b.count.cmp(&a.count).then(a.owner.cmp(&b.owner)));
            stats.push(NamespaceStats {
                namespace: ns,
                total_records,
                deleted_records,
                last_updated_at,
                owner_counts,
            });
        }
        Ok((stats, total))
    }
}

fn compare_sort_field(a: &Record, b: &Record, field: &str) -> std::cmp::Ordering {
    match field {
        "namespace" => a.namespace.cmp(&b.namespace),
        "key" => a.key.cmp(&b.key),
        "owner" => a.owner.cmp(&b.owner),
        "schemaHash" => a.schema_hash.cmp(&b.schema_hash),
        "version" => a.version.cmp(&b.version),
        "createdAt" => a.created_at.cmp(&b.created_at),
        "createdBy" => a.created_by.cmp(&b.created_by),
        "updatedBy" => a.updated_by.cmp(&b.updated_by),
        "deletedAt" => a.deleted_at.cmp(&b.deleted_at),
        _ => a.updated_at.cmp(&b.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Pagination, Projection, SearchRequest};

    fn req(namespace: &str) -> SearchRequest {
        SearchRequest {
            namespace: namespace.to_string(),
            filter: None,
            sort: vec![],
            pagination: Pagination::default(),
            projection: Projection::default(),
            summary: false,
            include_deleted: false,
        }
    }

    #[tokio::test]
    async fn create_then_fetch_round_trips() {
        let store = InMemoryStore::new();
        let outcome = store
            .create_record(
                "analytics",
                "pipeline-1",
                NewRecordInput {
                    metadata: serde_json::json!({"status": "active"}),
                    tags: vec!["beta".into()],
                    owner: Some("data-team@apphub.dev".into()),
                    schema_hash: Some("sha256:abc123".into()),
                },
                None,
            )
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.record.version, 1);

        let fetched = store
            .fetch_record("analytics", "pipeline-1", false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.tags, vec!["beta".to_string()]);
    }

    #[tokio::test]
    async fn second_create_is_a_silent_no_op_on_live_match() {
        let store = InMemoryStore::new();
        store
            .create_record("analytics", "x", NewRecordInput::default(), None)
            .await
            .unwrap();
        let second = store
            .create_record("analytics", "x", NewRecordInput::default(), None)
            .await
            .unwrap();
        assert!(!second.created);
    }

    #[tokio::test]
    async fn upsert_conflict_on_expected_version_mismatch() {
        let store = InMemoryStore::new();
        store
            .create_record("analytics", "x", NewRecordInput::default(), None)
            .await
            .unwrap();
        let err = store
            .upsert_record(
                "analytics",
                "x",
                UpsertInput {
                    metadata: serde_json::json!({}),
                    tags: vec![],
                    owner: None,
                    schema_hash: None,
                    expected_version: Some(99),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLock { .. }));
    }

    #[tokio::test]
    async fn idempotent_soft_delete_reports_not_mutated() {
        let store = InMemoryStore::new();
        store
            .create_record("analytics", "x", NewRecordInput::default(), None)
            .await
            .unwrap();
        let first = store
            .soft_delete_record("analytics", "x", None, None)
            .await
            .unwrap();
        assert!(first.mutated);
        let version_after_delete = first.record.version;
        let second = store
            .soft_delete_record("analytics", "x", None, None)
            .await
            .unwrap();
        assert!(!second.mutated);
        assert_eq!(second.record.version, version_after_delete);
    }

    #[tokio::test]
    async fn search_filters_by_namespace_and_paginates() {
        let store = InMemoryStore::new();
        for i in 0..3 {
            store
                .create_record(
                    "analytics",
                    &format!("k{i}"),
                    NewRecordInput::default(),
                    None,
                )
                .await
                .unwrap();
        }
        let mut request = req("analytics");
        request.pagination.limit = 2;
        let result = store.search_records(&request).await.unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.records.len(), 2);
    }
}
