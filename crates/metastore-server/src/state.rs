//! Shared application state (`spec.md` §6 HTTP surface).
//!
//! One `Arc`-backed struct handed to every handler via `State`, grounded
//! on the `ForgeState` pattern from the axum reference crate this server
//! otherwise follows for routing: a plain `Clone` struct of already-`Arc`
//! components rather than a god object behind a single lock.

use std::sync::Arc;

use metastore_core::config::Settings;
use metastore_core::db::MetastoreStore;
use metastore_core::events::StreamHub;
use metastore_core::filestore::{FilestoreConsumer, HealthTracker};
use metastore_core::services::{NamespaceSummaryCache, RecordService, SchemaCache, TokenIndex};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetastoreStore>,
    pub records: Arc<RecordService>,
    pub schemas: Arc<SchemaCache>,
    pub namespaces: Arc<NamespaceSummaryCache>,
    pub tokens: Arc<TokenIndex>,
    pub stream_hub: Arc<StreamHub>,
    pub filestore: Option<Arc<FilestoreConsumer>>,
    pub filestore_health: Arc<HealthTracker>,
    pub settings: Arc<Settings>,
}
