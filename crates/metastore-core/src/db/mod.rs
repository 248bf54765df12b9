//! Persistence layer (`spec.md` §4.B, §4.C, §4.H, §4.I, §6).
//!
//! [`MetastoreStore`] is the seam between the service layer and storage:
//! [`PgStore`] is the production backend, [`InMemoryStore`] the test
//! double used everywhere a live database would otherwise be required.

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod store;
pub mod types;

pub use error::RepositoryError;
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::MetastoreStore;
pub use types::{
    CreateOutcome, HardDeleteOutcome, NamespaceStats, OwnerCount, PatchOutcome, RestoreOutcome,
    SearchResult, SoftDeleteOutcome, UpsertOutcome,
};
