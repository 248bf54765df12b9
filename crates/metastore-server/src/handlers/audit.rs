//! `GET /records/{namespace}/{key}/audit` and `.../audit/{id}/diff`
//! (`spec.md` §4.C, §6).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use metastore_core::models::token::Scope;
use metastore_core::services::{diff_entry, ServiceError};

use crate::auth::AuthContext;
use crate::error_response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct AuditListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    auth: AuthContext,
    Query(query): Query<AuditListQuery>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Read)?;
    auth.require_namespace(&namespace)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let (entries, total) = state
        .store
        .list_audit(&namespace, &key, limit, offset)
        .await
        .map_err(ServiceError::from)?;

    Ok(Json(json!({
        "pagination": { "total": total, "limit": limit, "offset": offset },
        "entries": entries,
    })))
}

pub async fn diff(
    State(state): State<AppState>,
    Path((namespace, key, audit_id)): Path<(String, String, i64)>,
    auth: AuthContext,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Read)?;
    auth.require_namespace(&namespace)?;

    let entry = state
        .store
        .get_audit_by_id(&namespace, &key, audit_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| ServiceError::audit_not_found(namespace.clone(), key.clone(), audit_id.to_string()))?;

    let diff = diff_entry(&entry);
    Ok(Json(json!({ "entry": entry, "diff": diff })))
}
