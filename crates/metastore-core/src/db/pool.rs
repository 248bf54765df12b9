//! Postgres connection pool construction (`spec.md` §5 resource policy).

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

use crate::config::Settings;

use super::error::RepositoryError;

/// Build the shared pool the HTTP server and filestore consumer both draw
/// connections from. A `(namespace, key)` write transaction holds one
/// connection for its lifetime (`spec.md` §5); the pool caps how many of
/// those can run concurrently.
pub async fn connect(settings: &Settings) -> Result<PgPool, RepositoryError> {
    let mut options: PgConnectOptions = settings
        .database_url
        .parse()
        .map_err(|e| RepositoryError::Corrupt(format!("invalid DATABASE_URL: {e}")))?;
    if let Some(schema) = &settings.pg_schema {
        options = options.options([("search_path", schema.as_str())]);
    }

    let pool = PgPoolOptions::new()
        .max_connections(settings.pool.max_connections)
        .idle_timeout(settings.pool.idle_timeout)
        .acquire_timeout(settings.pool.acquire_timeout)
        .connect_with(options)
        .await?;

    if let Some(schema) = &settings.pg_schema {
        sqlx::raw_sql(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
            .execute(&pool)
            .await?;
    }

    info!(
        max_connections = settings.pool.max_connections,
        schema = settings.pg_schema.as_deref().unwrap_or("public"),
        "connected to postgres"
    );
    Ok(pool)
}
