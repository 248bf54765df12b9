//! Service-layer error types (`spec.md` §4.D, §7).

use thiserror::Error;

use crate::db::RepositoryError;
use crate::filter::FilterError;
use crate::models::record::ValidationError;

/// Errors surfaced by the record service, schema cache, and namespace
/// summary — the classification boundary the HTTP layer maps to status
/// codes (`spec.md` §7).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("bad_request: {0}")]
    Validation(#[from] ValidationError),

    #[error("bad_request: {0}")]
    Filter(#[from] FilterError),

    #[error("not_found: {namespace}/{key}")]
    NotFound { namespace: String, key: String },

    #[error("not_found: audit entry {audit_ref} for {namespace}/{key}")]
    AuditNotFound {
        namespace: String,
        key: String,
        audit_ref: String,
    },

    #[error("version_conflict: expected version {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },

    #[error("record_deleted: {namespace}/{key} is soft-deleted")]
    RecordDeleted { namespace: String, key: String },

    #[error("bad_request: restore requires exactly one of auditId or version")]
    AmbiguousRestoreTarget,

    #[error("bad_request: bulk operation at index {index} is invalid: {reason}")]
    InvalidBulkOperation { index: usize, reason: String },

    #[error("upsert_failed: {0}")]
    UpsertFailed(String),

    #[error("internal_error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    pub fn not_found(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    pub fn audit_not_found(
        namespace: impl Into<String>,
        key: impl Into<String>,
        audit_ref: impl Into<String>,
    ) -> Self {
        Self::AuditNotFound {
            namespace: namespace.into(),
            key: key.into(),
            audit_ref: audit_ref.into(),
        }
    }

    pub fn invalid_bulk_operation(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidBulkOperation {
            index,
            reason: reason.into(),
        }
    }

    /// The stable error kind used in HTTP error bodies and bulk operation
    /// failure entries (`spec.md` §6, §7) — not a `Display` string.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) | ServiceError::Filter(_) | ServiceError::InvalidBulkOperation { .. } => {
                "bad_request"
            }
            ServiceError::NotFound { .. } | ServiceError::AuditNotFound { .. } => "not_found",
            ServiceError::VersionConflict { .. } => "version_conflict",
            ServiceError::RecordDeleted { .. } => "record_deleted",
            ServiceError::AmbiguousRestoreTarget => "bad_request",
            ServiceError::UpsertFailed(_) => "upsert_failed",
            ServiceError::Repository(_) => "internal_error",
        }
    }
}

/// Translate a repository-level error into its service-level counterpart,
/// collapsing `OptimisticLock`/`RecordDeleted`/`NotFound` into their named
/// `ServiceError` variants so HTTP mapping doesn't need to know about the
/// repository layer at all.
pub fn from_repository(namespace: &str, key: &str, err: RepositoryError) -> ServiceError {
    match err {
        RepositoryError::OptimisticLock { expected, actual } => {
            ServiceError::VersionConflict { expected, actual }
        }
        RepositoryError::RecordDeleted { .. } => ServiceError::RecordDeleted {
            namespace: namespace.to_string(),
            key: key.to_string(),
        },
        RepositoryError::NotFound { .. } => ServiceError::not_found(namespace, key),
        other => ServiceError::Repository(other),
    }
}
