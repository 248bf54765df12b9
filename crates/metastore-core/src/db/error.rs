//! Repository error types (`spec.md` §4.B, §7).

use thiserror::Error;

/// Errors raised by the record/audit/schema store layer.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// `expectedVersion` did not match the row's current version.
    #[error("version_conflict: expected version {expected}, found {actual}")]
    OptimisticLock { expected: i64, actual: i64 },

    /// Write attempted against a soft-deleted record.
    #[error("record_deleted: {namespace}/{key} is soft-deleted")]
    RecordDeleted { namespace: String, key: String },

    /// Point lookup found nothing.
    #[error("not_found: {namespace}/{key}")]
    NotFound { namespace: String, key: String },

    /// Audit entry lookup found nothing.
    #[error("not_found: audit entry for {namespace}/{key}")]
    AuditNotFound { namespace: String, key: String },

    /// A write produced no row where one was expected.
    #[error("upsert_failed: {0}")]
    UpsertFailed(String),

    /// Underlying SQL driver error.
    #[error("database operation failed: {0}")]
    Sql(#[from] sqlx::Error),

    /// Row data failed to deserialize into a domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A filter/search request could not be compiled.
    #[error(transparent)]
    Filter(#[from] crate::filter::FilterError),
}

impl RepositoryError {
    pub fn optimistic_lock(expected: i64, actual: i64) -> Self {
        Self::OptimisticLock { expected, actual }
    }

    pub fn record_deleted(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::RecordDeleted {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    pub fn not_found(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}
