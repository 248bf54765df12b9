//! `POST /records/search` (`spec.md` §4.A, §6).

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use metastore_core::filter::SearchRequest;
use metastore_core::models::token::Scope;

use super::project;
use crate::auth::AuthContext;
use crate::error_response::ApiError;
use crate::state::AppState;

pub async fn search(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Read)?;
    auth.require_namespace(&request.namespace)?;

    let offset: u64 = request
        .pagination
        .cursor
        .as_deref()
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let limit = request.pagination.clamped_limit();
    let fields = request.resolved_projection();

    let result = state.records.search(&request).await?;
    let records: Vec<Value> = result
        .records
        .into_iter()
        .map(|record| project(serde_json::to_value(record).unwrap_or(Value::Null), &fields))
        .collect();

    Ok(Json(json!({
        "pagination": {
            "total": result.total,
            "limit": limit,
            "offset": offset,
        },
        "records": records,
    })))
}
