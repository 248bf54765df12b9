//! Metastore HTTP server (`spec.md` §6).
//!
//! `main.rs` wires concrete dependencies (Postgres, env-derived settings)
//! and calls [`serve`]; `tests/` builds an [`state::AppState`] over
//! [`metastore_core::db::InMemoryStore`] and drives [`routes::build`]
//! directly with `tower::ServiceExt::oneshot`.

pub mod auth;
pub mod error_response;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod tokens;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use metastore_core::config::Settings;
use metastore_core::db::{self, MetastoreStore, PgStore, RepositoryError};
use metastore_core::events::{LazyBusPublisher, NullBusPublisher, StreamHub};
use metastore_core::filestore::{FilestoreConsumer, HealthTracker};
use metastore_core::models::schema::SchemaDefinition;
use metastore_core::services::{
    NamespaceSummaryCache, RecordService, SchemaCache, SchemaCacheConfig, SchemaLoader, TokenIndex,
};

use crate::state::AppState;

/// Bridges the schema cache to the store, the way `spec.md` §4.H expects
/// `MetastoreStore::get_schema` to back it in production.
struct StoreSchemaLoader(Arc<dyn MetastoreStore>);

#[async_trait]
impl SchemaLoader for StoreSchemaLoader {
    async fn load(&self, hash: &str) -> Result<Option<SchemaDefinition>, RepositoryError> {
        self.0.get_schema(hash).await
    }
}

/// Builds every long-lived component from `settings` and binds the HTTP
/// listener. Runs until the server is killed.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let pool = db::pool::connect(&settings).await?;
    db::migrations::run(&pool).await?;

    let store: Arc<dyn MetastoreStore> = Arc::new(PgStore::new(pool));
    let stream_hub = StreamHub::new();

    // No durable bus transport is wired in this deployment yet; committed
    // mutations still fan out over the in-process stream hub regardless.
    let bus = Arc::new(LazyBusPublisher::new(|| async {
        Ok(Arc::new(NullBusPublisher) as Arc<dyn metastore_core::events::BusPublisher>)
    }));

    let records = Arc::new(RecordService::new(store.clone(), stream_hub.clone(), bus));

    let schema_cache_config = SchemaCacheConfig::new(
        std::time::Duration::from_secs(300),
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(30),
        None,
    );
    let schemas = SchemaCache::new(Arc::new(StoreSchemaLoader(store.clone())), schema_cache_config);
    schemas.spawn_periodic_refresh();

    let namespaces = Arc::new(NamespaceSummaryCache::new(store.clone()));

    let token_records = tokens::load(settings.tokens_json.as_deref(), settings.tokens_path.as_deref())?;
    let tokens_index = Arc::new(TokenIndex::new(token_records));

    let filestore_health = Arc::new(HealthTracker::new(
        settings.filestore_sync_enabled,
        matches!(settings.filestore_transport, metastore_core::config::FilestoreTransport::Inline),
        settings.filestore_stall_threshold,
    ));

    let filestore = if settings.filestore_sync_enabled {
        Some(Arc::new(FilestoreConsumer::spawn(
            store.clone(),
            settings.filestore_namespace.clone(),
            filestore_health.clone(),
        )))
    } else {
        None
    };

    let host = settings.host;
    let port = settings.port;
    let settings = Arc::new(settings);

    let app_state = AppState {
        store,
        records,
        schemas,
        namespaces,
        tokens: tokens_index,
        stream_hub,
        filestore,
        filestore_health,
        settings,
    };

    let router = routes::build(app_state);
    let addr = SocketAddr::new(host, port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metastore server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
