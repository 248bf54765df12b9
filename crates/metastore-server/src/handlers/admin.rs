//! `POST /admin/tokens/reload` (`spec.md` §3, §6).

use axum::extract::State;
use axum::Json;
use serde_json::json;

use metastore_core::models::token::Scope;

use crate::auth::AuthContext;
use crate::error_response::ApiError;
use crate::state::AppState;
use crate::tokens;

pub async fn reload_tokens(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.require_scope(Scope::Admin)?;

    let records = tokens::load(state.settings.tokens_json.as_deref(), state.settings.tokens_path.as_deref())
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let count = records.len();
    state.tokens.reload(records);
    Ok(Json(json!({ "reloaded": true, "count": count })))
}
