//! HTTP error mapping (`spec.md` §7 error kind table).
//!
//! One edge translator from every internal failure type into the
//! `{error, message}` body shape the HTTP surface promises, grounded on
//! the axum reference crate's `ForgeError` (`status_code`/`error_kind`
//! methods plus a single `impl IntoResponse`).

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use metastore_core::filestore::ConsumerError;
use metastore_core::services::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("unknown bearer token")]
    InvalidToken,
    #[error("token lacks the {0} scope")]
    InsufficientScope(&'static str),
    #[error("token is not authorized for namespace {0:?}")]
    NamespaceForbidden(String),
}

/// The single error type every handler's `Result` resolves to.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    Auth(AuthError),
    BadRequest(String),
    Unavailable(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Service(err) => match err.kind() {
                "bad_request" => StatusCode::BAD_REQUEST,
                "not_found" => StatusCode::NOT_FOUND,
                "version_conflict" | "record_deleted" => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Auth(AuthError::MissingToken) | ApiError::Auth(AuthError::InvalidToken) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_kind(&self) -> &'static str {
        match self {
            ApiError::Service(err) => err.kind(),
            ApiError::Auth(AuthError::MissingToken) | ApiError::Auth(AuthError::InvalidToken) => "unauthorized",
            ApiError::Auth(_) => "forbidden",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unavailable(_) => "unavailable",
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Service(err) => write!(f, "{err}"),
            ApiError::Auth(err) => write!(f, "{err}"),
            ApiError::BadRequest(msg) => write!(f, "{msg}"),
            ApiError::Unavailable(msg) => write!(f, "{msg}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.error_kind();
        let message = self.to_string();
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl From<ConsumerError> for ApiError {
    fn from(err: ConsumerError) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}
