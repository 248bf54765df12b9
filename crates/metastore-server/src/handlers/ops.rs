//! `GET /healthz`, `/readyz`, `/metrics`, `/filestore/health`
//! (`spec.md` §4.G, §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

pub async fn healthz() -> &'static str {
    "ok"
}

/// Readiness is a lightweight store round-trip rather than a full
/// dependency probe — a dead database is the only thing that should
/// pull this service out of a load balancer's rotation.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.namespace_stats(&metastore_core::models::token::NamespaceScope::All, None, 1, 0).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "ready": true }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "error": err.to_string() })),
        ),
    }
}

pub async fn metrics() -> (StatusCode, String) {
    match prometheus::TextEncoder::new().encode_to_string(&prometheus::default_registry().gather()) {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub async fn filestore_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.filestore_health.snapshot(Utc::now());
    Json(json!({ "filestore": snapshot }))
}
