//! Business logic layer (`spec.md` §4.D, §4.H, §4.I).
//!
//! [`record_service`] is the seam HTTP handlers call into for record
//! CRUD, search and bulk writes. [`schema_cache`] and [`namespace_summary`]
//! wrap the corresponding store queries with process-local caching.
//! [`token_index`] and [`diff`] are smaller supporting pieces used by
//! auth and the audit diff endpoint respectively.

pub mod diff;
pub mod error;
pub mod metrics;
pub mod namespace_summary;
pub mod record_service;
pub mod schema_cache;
pub mod token_index;

pub use diff::diff_entry;
pub use error::{from_repository, ServiceError};
pub use namespace_summary::NamespaceSummaryCache;
pub use record_service::{
    BulkError, BulkOperationInput, BulkOperationOutcome, CreateResult, MutationResult,
    RecordService, RestoreResult, RestoreTarget,
};
pub use schema_cache::{CacheMetricsSnapshot, SchemaCache, SchemaCacheConfig, SchemaLoader};
pub use token_index::TokenIndex;
