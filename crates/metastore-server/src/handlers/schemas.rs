//! `GET /schemas/{hash}` and `POST /admin/schemas` (`spec.md` §4.H, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use metastore_core::models::schema::SchemaRegistration;
use metastore_core::models::token::Scope;
use metastore_core::services::ServiceError;

use crate::auth::AuthContext;
use crate::error_response::ApiError;
use crate::state::AppState;

pub async fn get(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    auth: AuthContext,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.require_scope(Scope::Read)?;
    let schema = state
        .schemas
        .get(&hash)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| ApiError::Service(ServiceError::not_found("schemas", hash.clone())))?;
    Ok(Json(json!({ "schema": schema })))
}

pub async fn register(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(registration): Json<SchemaRegistration>,
) -> Result<Response, ApiError> {
    auth.require_scope(Scope::Admin)?;
    let schema = state
        .store
        .put_schema(registration)
        .await
        .map_err(ServiceError::from)?;
    Ok((StatusCode::CREATED, Json(json!({ "schema": schema }))).into_response())
}
