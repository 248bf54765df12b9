//! `POST /records/bulk` (`spec.md` §4.D.1, §6).

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use metastore_core::events::BulkMode;
use metastore_core::models::token::Scope;
use metastore_core::services::BulkOperationInput;

use crate::auth::AuthContext;
use crate::error_response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkOperationBody {
    #[serde(rename = "type", default)]
    operation_type: Option<String>,
    namespace: String,
    key: String,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    schema_hash: Option<String>,
    #[serde(default)]
    expected_version: Option<i64>,
}

impl From<BulkOperationBody> for BulkOperationInput {
    fn from(body: BulkOperationBody) -> Self {
        BulkOperationInput {
            operation_type: body.operation_type,
            namespace: body.namespace,
            key: body.key,
            metadata: body.metadata,
            tags: body.tags,
            owner: body.owner,
            schema_hash: body.schema_hash,
            expected_version: body.expected_version,
        }
    }
}

fn default_bulk_mode() -> BulkMode {
    BulkMode::ContinueOnError
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BulkRequestBody {
    #[serde(default = "default_bulk_mode")]
    mode: BulkMode,
    operations: Vec<BulkOperationBody>,
}

pub async fn bulk(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<BulkRequestBody>,
) -> Result<Json<Value>, ApiError> {
    auth.require_scope(Scope::Write)?;
    for op in &body.operations {
        auth.require_namespace(&op.namespace)?;
    }

    let operations = body.operations.into_iter().map(BulkOperationInput::from).collect();
    let outcomes = state
        .records
        .bulk(operations, body.mode, &auth.0, Some(auth.0.subject.clone()))
        .await?;

    let rendered: Vec<Value> = outcomes
        .into_iter()
        .map(|outcome| {
            if let Some(err) = outcome.error {
                json!({
                    "status": "error",
                    "type": outcome.operation_type,
                    "namespace": outcome.namespace,
                    "key": outcome.key,
                    "error": {
                        "statusCode": err.status_code,
                        "code": err.code,
                        "message": err.message,
                    },
                })
            } else {
                json!({
                    "status": "ok",
                    "type": outcome.operation_type,
                    "namespace": outcome.namespace,
                    "key": outcome.key,
                    "record": outcome.record,
                    "created": outcome.created,
                    "idempotent": outcome.idempotent,
                })
            }
        })
        .collect();

    Ok(Json(json!({ "operations": rendered })))
}
