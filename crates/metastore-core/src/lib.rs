//! Metastore core
//!
//! The metadata record engine behind the metastore HTTP service: record
//! CRUD with optimistic concurrency and soft delete, an append-only audit
//! trail, a JSON filter compiler that emits parameterised SQL, a schema
//! registry cache, namespace summaries, SSE/WebSocket event fan-out, and
//! filestore event reconciliation. The HTTP surface itself lives in the
//! `metastore-server` binary crate; this crate is the library it wires up.

pub mod config;
pub mod db;
pub mod events;
pub mod filestore;
pub mod filter;
pub mod models;
pub mod services;
