//! Postgres-backed implementation of [`MetastoreStore`] (`spec.md` §4.B,
//! §4.C, §6 persistence layout).
//!
//! Every mutating method opens its own transaction and takes `SELECT …
//! FOR UPDATE` on the target row before reading it, serialising
//! concurrent writers on the same `(namespace, key)` (`spec.md` §4.B).
//! Queries are issued through the dynamic `sqlx::query` API rather than
//! the `query!` compile-time macros, since this crate is built without a
//! live `DATABASE_URL`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;

use crate::filter::{compile, SearchRequest, SqlPart, SqlValue};
use crate::models::audit::{AuditAction, AuditEntry};
use crate::models::record::{
    deep_merge, normalize_tags, unset_path, NewRecordInput, PatchInput, Patchable, Record,
    UpsertInput,
};
use crate::models::schema::{SchemaDefinition, SchemaFieldSpec, SchemaRegistration};
use crate::models::token::NamespaceScope;

use super::error::RepositoryError;
use super::store::MetastoreStore;
use super::types::{
    CreateOutcome, HardDeleteOutcome, NamespaceStats, OwnerCount, PatchOutcome, RestoreOutcome,
    SearchResult, SoftDeleteOutcome, UpsertOutcome,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &PgRow) -> Result<Record, RepositoryError> {
    Ok(Record {
        namespace: row.try_get("namespace")?,
        key: row.try_get("record_key")?,
        metadata: row.try_get("metadata")?,
        tags: row.try_get::<Vec<String>, _>("tags")?,
        owner: row.try_get("owner")?,
        schema_hash: row.try_get("schema_hash")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
    })
}

fn row_to_audit(row: &PgRow) -> Result<AuditEntry, RepositoryError> {
    let action_raw: String = row.try_get("action")?;
    let action = match action_raw.as_str() {
        "create" => AuditAction::Create,
        "update" => AuditAction::Update,
        "delete" => AuditAction::Delete,
        "restore" => AuditAction::Restore,
        other => return Err(RepositoryError::Corrupt(format!("unknown audit action {other:?}"))),
    };
    Ok(AuditEntry {
        id: row.try_get("id")?,
        namespace: row.try_get("namespace")?,
        key: row.try_get("record_key")?,
        action,
        actor: row.try_get("actor")?,
        previous_version: row.try_get("previous_version")?,
        version: row.try_get("version")?,
        metadata: row.try_get("metadata")?,
        previous_metadata: row.try_get("previous_metadata")?,
        tags: row.try_get::<Vec<String>, _>("tags")?,
        previous_tags: row.try_get::<Vec<String>, _>("previous_tags")?,
        owner: row.try_get("owner")?,
        previous_owner: row.try_get("previous_owner")?,
        schema_hash: row.try_get("schema_hash")?,
        previous_schema_hash: row.try_get("previous_schema_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_schema(row: &PgRow) -> Result<SchemaDefinition, RepositoryError> {
    let fields_raw: Value = row.try_get("fields")?;
    let fields: Vec<SchemaFieldSpec> = serde_json::from_value(fields_raw)
        .map_err(|e| RepositoryError::Corrupt(format!("bad schema fields json: {e}")))?;
    Ok(SchemaDefinition {
        schema_hash: row.try_get("schema_hash")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        version: row.try_get("version")?,
        fields,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn lock_record(
    tx: &mut Transaction<'_, Postgres>,
    namespace: &str,
    key: &str,
) -> Result<Option<Record>, RepositoryError> {
    let row = sqlx::query(
        "SELECT namespace, record_key, metadata, tags, owner, schema_hash, version, \
         created_at, updated_at, deleted_at, created_by, updated_by \
         FROM records WHERE namespace = $1 AND record_key = $2 FOR UPDATE",
    )
    .bind(namespace)
    .bind(key)
    .fetch_optional(&mut **tx)
    .await?;
    row.as_ref().map(row_to_record).transpose()
}

fn check_expected_version(expected: Option<i64>, actual: i64) -> Result<(), RepositoryError> {
    match expected {
        Some(v) if v != actual => Err(RepositoryError::optimistic_lock(v, actual)),
        _ => Ok(()),
    }
}

async fn insert_audit(
    tx: &mut Transaction<'_, Postgres>,
    namespace: &str,
    key: &str,
    action: AuditAction,
    actor: Option<&str>,
    previous: Option<&Record>,
    current: &Record,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO audits (namespace, record_key, action, actor, previous_version, version, \
         metadata, previous_metadata, tags, previous_tags, owner, previous_owner, \
         schema_hash, previous_schema_hash, created_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14, NOW())",
    )
    .bind(namespace)
    .bind(key)
    .bind(action.as_str())
    .bind(actor)
    .bind(previous.map(|p| p.version))
    .bind(current.version)
    .bind(&current.metadata)
    .bind(previous.map(|p| p.metadata.clone()).unwrap_or(Value::Null))
    .bind(&current.tags)
    .bind(previous.map(|p| p.tags.clone()).unwrap_or_default())
    .bind(&current.owner)
    .bind(previous.and_then(|p| p.owner.clone()))
    .bind(&current.schema_hash)
    .bind(previous.and_then(|p| p.schema_hash.clone()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl MetastoreStore for PgStore {
    #[instrument(skip(self, input))]
    async fn create_record(
        &self,
        namespace: &str,
        key: &str,
        input: NewRecordInput,
        actor: Option<String>,
    ) -> Result<CreateOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let existing = lock_record(&mut tx, namespace, key).await?;

        let tags = normalize_tags(input.tags.into_iter())
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let inserted = sqlx::query(
            "INSERT INTO records (namespace, record_key, metadata, tags, owner, schema_hash, \
             version, created_at, updated_at, created_by, updated_by) \
             VALUES ($1,$2,$3,$4,$5,$6,1,NOW(),NOW(),$7,$7) \
             ON CONFLICT (namespace, record_key) DO NOTHING \
             RETURNING namespace, record_key, metadata, tags, owner, schema_hash, version, \
             created_at, updated_at, deleted_at, created_by, updated_by",
        )
        .bind(namespace)
        .bind(key)
        .bind(&input.metadata)
        .bind(&tags)
        .bind(&input.owner)
        .bind(&input.schema_hash)
        .bind(&actor)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(row) => {
                let record = row_to_record(&row)?;
                insert_audit(
                    &mut tx,
                    namespace,
                    key,
                    AuditAction::Create,
                    actor.as_deref(),
                    None,
                    &record,
                )
                .await?;
                CreateOutcome {
                    record,
                    created: true,
                }
            }
            None => {
                let record = existing.ok_or_else(|| {
                    RepositoryError::UpsertFailed(format!(
                        "conflicting insert for {namespace}/{key} but no row visible"
                    ))
                })?;
                CreateOutcome {
                    record,
                    created: false,
                }
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    #[instrument(skip(self, input))]
    async fn upsert_record(
        &self,
        namespace: &str,
        key: &str,
        input: UpsertInput,
        actor: Option<String>,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let existing = lock_record(&mut tx, namespace, key).await?;

        let Some(existing) = existing else {
            drop(tx);
            let created = self
                .create_record(
                    namespace,
                    key,
                    NewRecordInput {
                        metadata: input.metadata,
                        tags: input.tags,
                        owner: input.owner,
                        schema_hash: input.schema_hash,
                    },
                    actor,
                )
                .await?;
            return Ok(UpsertOutcome {
                record: created.record,
                previous: None,
                created: true,
            });
        };

        check_expected_version(input.expected_version, existing.version)?;
        let tags = normalize_tags(input.tags.into_iter())
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        let row = sqlx::query(
            "UPDATE records SET metadata = $1, tags = $2, owner = $3, schema_hash = $4, \
             updated_at = NOW(), updated_by = $5, version = version + 1, deleted_at = NULL \
             WHERE namespace = $6 AND record_key = $7 \
             RETURNING namespace, record_key, metadata, tags, owner, schema_hash, version, \
             created_at, updated_at, deleted_at, created_by, updated_by",
        )
        .bind(&input.metadata)
        .bind(&tags)
        .bind(&input.owner)
        .bind(&input.schema_hash)
        .bind(&actor)
        .bind(namespace)
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
        let updated = row_to_record(&row)?;
        insert_audit(
            &mut tx,
            namespace,
            key,
            AuditAction::Update,
            actor.as_deref(),
            Some(&existing),
            &updated,
        )
        .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let existing = lock_record(&mut tx, namespace, key)
            .await?
            .ok_or_else(|| RepositoryError::not_found(namespace, key))?;
        if existing.is_deleted() {
            return Err(RepositoryError::record_deleted(namespace, key));
        }
        check_expected_version(expected_version, existing.version)?;

        let mut metadata = existing
            .metadata
            .as_object()
            .cloned()
            .unwrap_or_default();
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

        let row = sqlx::query(
            "UPDATE records SET metadata = $1, tags = $2, owner = $3, schema_hash = $4, \
             version = version + 1, updated_at = NOW(), updated_by = $5 \
             WHERE namespace = $6 AND record_key = $7 \
             RETURNING namespace, record_key, metadata, tags, owner, schema_hash, version, \
             created_at, updated_at, deleted_at, created_by, updated_by",
        )
        .bind(Value::Object(metadata))
        .bind(&tags)
        .bind(&owner)
        .bind(&schema_hash)
        .bind(&actor)
        .bind(namespace)
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
        let updated = row_to_record(&row)?;
        insert_audit(
            &mut tx,
            namespace,
            key,
            AuditAction::Update,
            actor.as_deref(),
            Some(&existing),
            &updated,
        )
        .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let existing = lock_record(&mut tx, namespace, key)
            .await?
            .ok_or_else(|| RepositoryError::not_found(namespace, key))?;
        if existing.is_deleted() {
            tx.commit().await?;
            return Ok(SoftDeleteOutcome {
                record: existing,
                mutated: false,
            });
        }
        check_expected_version(expected_version, existing.version)?;

        let row = sqlx::query(
            "UPDATE records SET deleted_at = NOW(), updated_at = NOW(), updated_by = $1, \
             version = version + 1 WHERE namespace = $2 AND record_key = $3 \
             RETURNING namespace, record_key, metadata, tags, owner, schema_hash, version, \
             created_at, updated_at, deleted_at, created_by, updated_by",
        )
        .bind(&actor)
        .bind(namespace)
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
        let updated = row_to_record(&row)?;
        insert_audit(
            &mut tx,
            namespace,
            key,
            AuditAction::Delete,
            actor.as_deref(),
            Some(&existing),
            &updated,
        )
        .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let existing = lock_record(&mut tx, namespace, key)
            .await?
            .ok_or_else(|| RepositoryError::not_found(namespace, key))?;
        check_expected_version(expected_version, existing.version)?;

        sqlx::query("DELETE FROM audits WHERE namespace = $1 AND record_key = $2")
            .bind(namespace)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM records WHERE namespace = $1 AND record_key = $2")
            .bind(namespace)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let existing = lock_record(&mut tx, namespace, key)
            .await?
            .ok_or_else(|| RepositoryError::not_found(namespace, key))?;
        check_expected_version(expected_version, existing.version)?;

        let tags = normalize_tags(snapshot.tags.iter().cloned())
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let row = sqlx::query(
            "UPDATE records SET metadata = $1, tags = $2, owner = $3, schema_hash = $4, \
             deleted_at = NULL, version = version + 1, updated_at = NOW(), updated_by = $5 \
             WHERE namespace = $6 AND record_key = $7 \
             RETURNING namespace, record_key, metadata, tags, owner, schema_hash, version, \
             created_at, updated_at, deleted_at, created_by, updated_by",
        )
        .bind(&snapshot.metadata)
        .bind(&tags)
        .bind(&snapshot.owner)
        .bind(&snapshot.schema_hash)
        .bind(&actor)
        .bind(namespace)
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
        let updated = row_to_record(&row)?;
        insert_audit(
            &mut tx,
            namespace,
            key,
            AuditAction::Restore,
            actor.as_deref(),
            Some(&existing),
            &updated,
        )
        .await?;
        tx.commit().await?;
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
        let sql = if include_deleted {
            "SELECT namespace, record_key, metadata, tags, owner, schema_hash, version, \
             created_at, updated_at, deleted_at, created_by, updated_by \
             FROM records WHERE namespace = $1 AND record_key = $2"
        } else {
            "SELECT namespace, record_key, metadata, tags, owner, schema_hash, version, \
             created_at, updated_at, deleted_at, created_by, updated_by \
             FROM records WHERE namespace = $1 AND record_key = $2 AND deleted_at IS NULL"
        };
        let row = sqlx::query(sql)
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn search_records(&self, request: &SearchRequest) -> Result<SearchResult, RepositoryError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT namespace, record_key, metadata, tags, owner, schema_hash, version, \
             created_at, updated_at, deleted_at, created_by, updated_by, \
             count(*) OVER() AS total_count FROM records WHERE namespace = ",
        );
        builder.push_bind(&request.namespace);
        if !request.include_deleted {
            builder.push(" AND deleted_at IS NULL");
        }
        if let Some(filter) = &request.filter {
            let compiled = compile(filter)?;
            builder.push(" AND (");
            for part in &compiled.parts {
                match part {
                    SqlPart::Raw(text) => {
                        builder.push(text.as_str());
                    }
                    SqlPart::Bind(value) => push_bind_value(&mut builder, value),
                }
            }
            builder.push(")");
        }
        if request.sort.is_empty() {
            builder.push(" ORDER BY updated_at DESC");
        } else {
            builder.push(" ORDER BY ");
            for (i, sort) in request.sort.iter().take(5).enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                let col = crate::filter::columns::sql_column(&sort.field).unwrap_or("updated_at");
                let dir = match sort.order {
                    crate::filter::SortOrder::Asc => "ASC",
                    crate::filter::SortOrder::Desc => "DESC",
                };
                builder.push(format!("{col} {dir}"));
            }
        }
        let limit = request.pagination.clamped_limit() as i64;
        builder.push(" LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(request.pagination.cursor.as_deref().unwrap_or("0").parse::<i64>().unwrap_or(0));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let total = rows
            .first()
            .map(|r| r.try_get::<i64, _>("total_count"))
            .transpose()?
            .unwrap_or(0);
        let records = rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()?;
        Ok(SearchResult { records, total })
    }

    async fn list_audit(
        &self,
        namespace: &str,
        key: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditEntry>, i64), RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, namespace, record_key, action, actor, previous_version, version, \
             metadata, previous_metadata, tags, previous_tags, owner, previous_owner, \
             schema_hash, previous_schema_hash, created_at, count(*) OVER() AS total_count \
             FROM audits WHERE namespace = $1 AND record_key = $2 \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
        )
        .bind(namespace)
        .bind(key)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total = rows
            .first()
            .map(|r| r.try_get::<i64, _>("total_count"))
            .transpose()?
            .unwrap_or(0);
        let entries = rows.iter().map(row_to_audit).collect::<Result<Vec<_>, _>>()?;
        Ok((entries, total))
    }

    async fn get_audit_by_id(
        &self,
        namespace: &str,
        key: &str,
        id: i64,
    ) -> Result<Option<AuditEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, namespace, record_key, action, actor, previous_version, version, \
             metadata, previous_metadata, tags, previous_tags, owner, previous_owner, \
             schema_hash, previous_schema_hash, created_at FROM audits \
             WHERE namespace = $1 AND record_key = $2 AND id = $3",
        )
        .bind(namespace)
        .bind(key)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_audit).transpose()
    }

    async fn get_audit_by_version(
        &self,
        namespace: &str,
        key: &str,
        version: i64,
    ) -> Result<Option<AuditEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, namespace, record_key, action, actor, previous_version, version, \
             metadata, previous_metadata, tags, previous_tags, owner, previous_owner, \
             schema_hash, previous_schema_hash, created_at FROM audits \
             WHERE namespace = $1 AND record_key = $2 AND version = $3",
        )
        .bind(namespace)
        .bind(key)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_audit).transpose()
    }

    async fn get_schema(&self, hash: &str) -> Result<Option<SchemaDefinition>, RepositoryError> {
        let row = sqlx::query(
            "SELECT schema_hash, name, description, version, fields, metadata, created_at, updated_at \
             FROM schemas WHERE schema_hash = $1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_schema).transpose()
    }

    async fn put_schema(
        &self,
        registration: SchemaRegistration,
    ) -> Result<SchemaDefinition, RepositoryError> {
        let fields_json = serde_json::to_value(&registration.fields)
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let row = sqlx::query(
            "INSERT INTO schemas (schema_hash, name, description, version, fields, metadata, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,NOW(),NOW()) \
             ON CONFLICT (schema_hash) DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description, \
             version = EXCLUDED.version, fields = EXCLUDED.fields, metadata = EXCLUDED.metadata, updated_at = NOW() \
             RETURNING schema_hash, name, description, version, fields, metadata, created_at, updated_at",
        )
        .bind(&registration.schema_hash)
        .bind(&registration.name)
        .bind(&registration.description)
        .bind(registration.version)
        .bind(fields_json)
        .bind(&registration.metadata)
        .fetch_one(&self.pool)
        .await?;
        row_to_schema(&row)
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

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT namespace, count(*) AS total, \
             count(*) FILTER (WHERE deleted_at IS NOT NULL) AS deleted, \
             max(updated_at) AS last_updated, count(*) OVER() AS total_namespaces \
             FROM records WHERE 1=1",
        );
        if let NamespaceScope::Allowed(set) = scope {
            let namespaces: Vec<String> = set.iter().cloned().collect();
            builder.push(" AND namespace = ANY(");
            builder.push_bind(namespaces);
            builder.push(")");
        }
        if let Some(p) = prefix {
            builder.push(" AND namespace LIKE ");
            builder.push_bind(format!("{p}%"));
        }
        builder.push(" GROUP BY namespace ORDER BY namespace LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let total = rows
            .first()
            .map(|r| r.try_get::<i64, _>("total_namespaces"))
            .transpose()?
            .unwrap_or(0);

        let mut stats = Vec::with_capacity(rows.len());
        for row in &rows {
            let namespace: String = row.try_get("namespace")?;
            let owner_rows = sqlx::query(
                "SELECT owner, count(*) AS cnt FROM records \
                 WHERE namespace = $1 AND deleted_at IS NULL AND owner IS NOT NULL \
                 GROUP BY owner ORDER BY cnt DESC",
            )
            .bind(&namespace)
            .fetch_all(&self.pool)
            .await?;
            let owner_counts = owner_rows
                .iter()
                .map(|r| -> Result<OwnerCount, RepositoryError> {
                    Ok(OwnerCount {
                        owner: r.try_get("owner")?,
                        count: r.try_get("cnt")?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            stats.push(NamespaceStats {
                namespace,
                total_records: row.try_get("total")?,
                deleted_records: row.try_get("deleted")?,
                last_updated_at: row.try_get("last_updated")?,
                owner_counts,
            });
        }
        Ok((stats, total))
    }
}

fn push_bind_value(builder: &mut QueryBuilder<Postgres>, value: &SqlValue) {
    match value {
        SqlValue::Text(s) => {
            builder.push_bind(s.clone());
        }
        SqlValue::Int(i) => {
            builder.push_bind(*i);
        }
        SqlValue::Float(f) => {
            builder.push_bind(*f);
        }
        SqlValue::Bool(b) => {
            builder.push_bind(*b);
        }
        SqlValue::Json(v) => {
            builder.push_bind(v.clone());
        }
        SqlValue::TextArray(arr) => {
            builder.push_bind(arr.clone());
        }
    }
}

