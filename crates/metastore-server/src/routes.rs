//! HTTP route table (`spec.md` §6).

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, audit, bulk, namespaces, ops, records, schemas, search, stream};
use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/records", post(records::create))
        .route(
            "/records/:namespace/:key",
            get(records::fetch)
                .put(records::upsert)
                .patch(records::patch)
                .delete(records::soft_delete),
        )
        .route("/records/:namespace/:key/purge", axum::routing::delete(records::purge))
        .route("/records/:namespace/:key/restore", post(records::restore))
        .route("/records/:namespace/:key/audit", get(audit::list))
        .route("/records/:namespace/:key/audit/:id/diff", get(audit::diff))
        .route("/records/search", post(search::search))
        .route("/records/bulk", post(bulk::bulk))
        .route("/namespaces", get(namespaces::list))
        .route("/stream/records", get(stream::stream))
        .route("/schemas/:hash", get(schemas::get))
        .route("/admin/schemas", post(schemas::register))
        .route("/admin/tokens/reload", post(admin::reload_tokens))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .route("/filestore/health", get(ops::filestore_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
