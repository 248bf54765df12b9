//! Hand-rolled SQL migrations (`spec.md` §6 persistence layout).
//!
//! No migration-framework dependency, mirroring the teacher: explicit SQL
//! text, applied inside a transaction, each id recorded in
//! `schema_migrations` so a given id never runs twice.

use sqlx::PgPool;
use tracing::info;

use super::error::RepositoryError;

struct Migration {
    id: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "0001_schema_migrations",
        sql: "CREATE TABLE IF NOT EXISTS schema_migrations (
            id TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    },
    Migration {
        id: "0002_records",
        sql: "CREATE TABLE records (
            namespace TEXT NOT NULL,
            record_key TEXT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            tags TEXT[] NOT NULL DEFAULT '{}',
            owner TEXT,
            schema_hash TEXT,
            version BIGINT NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ,
            created_by TEXT,
            updated_by TEXT,
            PRIMARY KEY (namespace, record_key)
        )",
    },
    Migration {
        id: "0003_records_indexes",
        sql: "CREATE INDEX idx_records_namespace_updated_at ON records (namespace, updated_at DESC) WHERE deleted_at IS NULL;
              CREATE INDEX idx_records_owner ON records (owner);
              CREATE INDEX idx_records_schema_hash ON records (schema_hash);
              CREATE INDEX idx_records_tags_gin ON records USING GIN (tags);
              CREATE INDEX idx_records_metadata_gin ON records USING GIN (metadata)",
    },
    Migration {
        id: "0004_audits",
        sql: "CREATE TABLE audits (
            id BIGSERIAL PRIMARY KEY,
            namespace TEXT NOT NULL,
            record_key TEXT NOT NULL,
            action TEXT NOT NULL,
            actor TEXT,
            previous_version BIGINT,
            version BIGINT NOT NULL,
            metadata JSONB NOT NULL,
            previous_metadata JSONB NOT NULL,
            tags TEXT[] NOT NULL,
            previous_tags TEXT[] NOT NULL,
            owner TEXT,
            previous_owner TEXT,
            schema_hash TEXT,
            previous_schema_hash TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    },
    Migration {
        id: "0005_audits_index",
        sql: "CREATE INDEX idx_audits_namespace_key_created_at ON audits (namespace, record_key, created_at DESC)",
    },
    Migration {
        id: "0006_schemas",
        sql: "CREATE TABLE schemas (
            schema_hash TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            version BIGINT NOT NULL,
            fields JSONB NOT NULL DEFAULT '[]'::jsonb,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    },
];

/// Apply every migration not yet recorded in `schema_migrations`, each in
/// its own transaction, in declaration order.
pub async fn run(pool: &PgPool) -> Result<(), RepositoryError> {
    ensure_bookkeeping_table(pool).await?;
    for migration in MIGRATIONS {
        let mut tx = pool.begin().await?;
        let already_applied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE id = $1)",
        )
        .bind(migration.id)
        .fetch_one(&mut *tx)
        .await?;
        if already_applied {
            tx.rollback().await?;
            continue;
        }
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (id) VALUES ($1)")
            .bind(migration.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(migration = migration.id, "applied migration");
    }
    Ok(())
}

/// The very first migration creates `schema_migrations` itself, so the
/// existence check above needs the table to already be there the first
/// time `run` is called against a fresh database.
async fn ensure_bookkeeping_table(pool: &PgPool) -> Result<(), RepositoryError> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            id TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}
