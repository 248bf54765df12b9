//! `MetastoreStore` — database abstraction layer (`spec.md` §4.B, §4.C,
//! §4.H, §4.I).
//!
//! Mirrors the shape of a node-store trait: one seam between the service
//! layer (business rules, transaction shaping) and the backend
//! (Postgres in production, an in-memory double in tests). Every
//! mutating method performs its own row lock and audit write — the
//! trait boundary is transactional, not just CRUD.

use async_trait::async_trait;

use crate::filter::SearchRequest;
use crate::models::audit::AuditEntry;
use crate::models::record::{NewRecordInput, PatchInput, UpsertInput};
use crate::models::schema::{SchemaDefinition, SchemaRegistration};
use crate::models::token::NamespaceScope;

use super::error::RepositoryError;
use super::types::{
    CreateOutcome, HardDeleteOutcome, NamespaceStats, PatchOutcome, RestoreOutcome, SearchResult,
    SoftDeleteOutcome, UpsertOutcome,
};

#[async_trait]
pub trait MetastoreStore: Send + Sync {
    //
    // RECORD LIFECYCLE (spec.md §4.B)
    //

    async fn create_record(
        &self,
        namespace: &str,
        key: &str,
        input: NewRecordInput,
        actor: Option<String>,
    ) -> Result<CreateOutcome, RepositoryError>;

    async fn upsert_record(
        &self,
        namespace: &str,
        key: &str,
        input: UpsertInput,
        actor: Option<String>,
    ) -> Result<UpsertOutcome, RepositoryError>;

    async fn patch_record(
        &self,
        namespace: &str,
        key: &str,
        patch: PatchInput,
        expected_version: Option<i64>,
        actor: Option<String>,
    ) -> Result<PatchOutcome, RepositoryError>;

    async fn soft_delete_record(
        &self,
        namespace: &str,
        key: &str,
        expected_version: Option<i64>,
        actor: Option<String>,
    ) -> Result<SoftDeleteOutcome, RepositoryError>;

    async fn hard_delete_record(
        &self,
        namespace: &str,
        key: &str,
        expected_version: Option<i64>,
    ) -> Result<HardDeleteOutcome, RepositoryError>;

    /// `snapshot` is whichever audit entry the service layer resolved via
    /// `auditId` XOR `version` (`spec.md` §4.D.5) — loaded outside the
    /// write transaction, applied inside it.
    async fn restore_record(
        &self,
        namespace: &str,
        key: &str,
        snapshot: &AuditEntry,
        expected_version: Option<i64>,
        actor: Option<String>,
    ) -> Result<RestoreOutcome, RepositoryError>;

    async fn fetch_record(
        &self,
        namespace: &str,
        key: &str,
        include_deleted: bool,
    ) -> Result<Option<crate::models::record::Record>, RepositoryError>;

    async fn search_records(&self, request: &SearchRequest) -> Result<SearchResult, RepositoryError>;

    //
    // AUDIT LOG (spec.md §4.C)
    //

    async fn list_audit(
        &self,
        namespace: &str,
        key: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditEntry>, i64), RepositoryError>;

    async fn get_audit_by_id(
        &self,
        namespace: &str,
        key: &str,
        id: i64,
    ) -> Result<Option<AuditEntry>, RepositoryError>;

    async fn get_audit_by_version(
        &self,
        namespace: &str,
        key: &str,
        version: i64,
    ) -> Result<Option<AuditEntry>, RepositoryError>;

    //
    // SCHEMA REGISTRY (spec.md §4.H, store side)
    //

    async fn get_schema(&self, hash: &str) -> Result<Option<SchemaDefinition>, RepositoryError>;

    async fn put_schema(
        &self,
        registration: SchemaRegistration,
    ) -> Result<SchemaDefinition, RepositoryError>;

    //
    // NAMESPACE SUMMARY (spec.md §4.I, store side)
    //

    async fn namespace_stats(
        &self,
        scope: &NamespaceScope,
        prefix: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<NamespaceStats>, i64), RepositoryError>;
}
