//! Data Models
//!
//! Core data structures shared across the query compiler, repository,
//! services and HTTP surface:
//!
//! - [`record`] — the `Record` entity, patch/upsert inputs, tag algebra,
//!   deep metadata merge/unset.
//! - [`audit`] — append-only audit entries and the out-of-band diff view.
//! - [`schema`] — schema registry entries.
//! - [`token`] — bearer token identity and scope model.

pub mod audit;
pub mod record;
pub mod schema;
pub mod token;

pub use audit::{AuditAction, AuditDiff, AuditEntry, AuditSnapshot, ChangedPath, MetadataDiff, ScalarDiff, TagDiff};
pub use record::{
    deep_merge, normalize_tags, unset_path, NewRecordInput, Patchable, PatchInput, Record,
    TagPatch, UpsertInput, ValidationError,
};
pub use schema::{SchemaDefinition, SchemaFieldSpec, SchemaRegistration};
pub use token::{Identity, NamespaceScope, Scope, TokenKind, TokenRecord};
