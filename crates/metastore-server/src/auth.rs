//! Bearer token extraction (`spec.md` §6, §3 token identity).
//!
//! Grounded on the axum reference crate's `AuthProvider` pattern, adapted
//! as a plain `FromRequestParts` extractor since `TokenIndex::lookup` is
//! already synchronous and lock-free — no boxed future indirection is
//! needed here.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use metastore_core::models::token::{Identity, Scope};

use crate::error_response::AuthError;
use crate::state::AppState;

/// The resolved caller identity for one request.
pub struct AuthContext(pub Identity);

impl AuthContext {
    pub fn require_scope(&self, scope: Scope) -> Result<(), AuthError> {
        if self.0.has_scope(scope) {
            Ok(())
        } else {
            Err(AuthError::InsufficientScope(scope.as_str()))
        }
    }

    pub fn require_namespace(&self, namespace: &str) -> Result<(), AuthError> {
        if self.0.can_access_namespace(namespace) {
            Ok(())
        } else {
            Err(AuthError::NamespaceForbidden(namespace.to_string()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.settings.auth_disabled {
            return Ok(AuthContext(Identity::local_dev()));
        }

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = header.strip_prefix("Bearer ").ok_or(AuthError::MissingToken)?;
        state.tokens.lookup(token).map(AuthContext).ok_or(AuthError::InvalidToken)
    }
}
