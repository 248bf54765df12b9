//! `GET /namespaces` (`spec.md` §4.I, §6).

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use metastore_core::models::token::Scope;
use metastore_core::services::ServiceError;

use crate::auth::AuthContext;
use crate::error_response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct NamespaceListQuery {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<NamespaceListQuery>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Read)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let (stats, total) = state
        .namespaces
        .list_namespaces(&auth.0.namespaces, query.prefix.as_deref(), limit, offset)
        .await
        .map_err(ServiceError::from)?;

    Ok(Json(json!({
        "pagination": { "total": total, "limit": limit, "offset": offset },
        "namespaces": stats,
    })))
}
