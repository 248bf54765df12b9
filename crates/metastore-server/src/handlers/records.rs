//! Single-record lifecycle endpoints (`spec.md` §6: `POST /records`,
//! `GET|PUT|PATCH|DELETE /records/{namespace}/{key}`, `.../purge`,
//! `.../restore`).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

use metastore_core::models::record::{NewRecordInput, PatchInput, Patchable, TagPatch, UpsertInput};
use metastore_core::models::token::Scope;
use metastore_core::services::RestoreTarget;

use crate::auth::AuthContext;
use crate::error_response::ApiError;
use crate::state::AppState;

/// `Some(None)` means the key was present with a JSON `null`; `None`
/// means the key was absent. Plain `Option<T>` can't distinguish those,
/// which is exactly the distinction `owner`/`schemaHash` patches need.
fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

fn patchable_of(value: Option<Option<String>>) -> Patchable<String> {
    match value {
        None => Patchable::Absent,
        Some(None) => Patchable::Clear,
        Some(Some(v)) => Patchable::Set(v),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRecordBody {
    namespace: String,
    key: String,
    #[serde(flatten)]
    input: NewRecordInput,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IncludeDeletedQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedVersionQuery {
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecordPatchBody {
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
    #[serde(default)]
    metadata_unset: Vec<String>,
    #[serde(default)]
    tags: Option<TagPatch>,
    #[serde(default, deserialize_with = "deserialize_some")]
    owner: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    schema_hash: Option<Option<String>>,
    #[serde(default)]
    expected_version: Option<i64>,
}

impl From<RecordPatchBody> for PatchInput {
    fn from(body: RecordPatchBody) -> Self {
        PatchInput {
            metadata: body.metadata,
            metadata_unset: body.metadata_unset,
            tags: body.tags,
            owner: patchable_of(body.owner),
            schema_hash: patchable_of(body.schema_hash),
            expected_version: body.expected_version,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RestoreBody {
    #[serde(default)]
    audit_id: Option<i64>,
    #[serde(default)]
    version: Option<i64>,
    #[serde(default)]
    expected_version: Option<i64>,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<CreateRecordBody>,
) -> Result<Response, ApiError> {
    auth.require_scope(Scope::Write)?;
    auth.require_namespace(&body.namespace)?;
    let result = state
        .records
        .create(&body.namespace, &body.key, body.input, Some(auth.0.subject.clone()))
        .await?;
    let status = if result.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(json!({
            "record": result.record,
            "created": result.created,
            "idempotent": result.idempotent,
        })),
    )
        .into_response())
}

pub async fn fetch(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    auth: AuthContext,
    Query(query): Query<IncludeDeletedQuery>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Read)?;
    auth.require_namespace(&namespace)?;
    let record = state.records.fetch(&namespace, &key, query.include_deleted).await?;
    Ok(Json(json!({ "record": record })))
}

pub async fn upsert(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    auth: AuthContext,
    Json(input): Json<UpsertInput>,
) -> Result<Response, ApiError> {
    auth.require_scope(Scope::Write)?;
    auth.require_namespace(&namespace)?;
    let result = state
        .records
        .upsert(&namespace, &key, input, Some(auth.0.subject.clone()))
        .await?;
    let status = if result.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(json!({
            "record": result.record,
            "created": result.created,
            "idempotent": result.idempotent,
        })),
    )
        .into_response())
}

pub async fn patch(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    auth: AuthContext,
    Json(body): Json<RecordPatchBody>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Write)?;
    auth.require_namespace(&namespace)?;
    let result = state
        .records
        .patch(&namespace, &key, body.into(), Some(auth.0.subject.clone()))
        .await?;
    Ok(Json(json!({
        "record": result.record,
        "idempotent": result.idempotent,
    })))
}

pub async fn soft_delete(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    auth: AuthContext,
    Query(query): Query<ExpectedVersionQuery>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Delete)?;
    auth.require_namespace(&namespace)?;
    let result = state
        .records
        .soft_delete(&namespace, &key, query.expected_version, Some(auth.0.subject.clone()))
        .await?;
    Ok(Json(json!({
        "record": result.record,
        "deleted": result.mutated,
        "idempotent": result.idempotent,
    })))
}

pub async fn purge(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    auth: AuthContext,
    Query(query): Query<ExpectedVersionQuery>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Delete)?;
    auth.require_namespace(&namespace)?;
    let previous = state.records.hard_delete(&namespace, &key, query.expected_version).await?;
    Ok(Json(json!({ "record": previous, "purged": true })))
}

pub async fn restore(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    auth: AuthContext,
    Json(body): Json<RestoreBody>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Write)?;
    auth.require_namespace(&namespace)?;
    let target = RestoreTarget {
        audit_id: body.audit_id,
        version: body.version,
    };
    let result = state
        .records
        .restore(&namespace, &key, target, body.expected_version, Some(auth.0.subject.clone()))
        .await?;
    Ok(Json(json!({ "record": result.record, "restored": true })))
}
