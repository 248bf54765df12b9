//! Schema registry entry (`spec.md` §3, §4.H).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single declared field within a schema definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaFieldSpec {
    pub path: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub hints: Value,
}

/// A registry entry keyed by `schemaHash`. Read-mostly; written via the
/// admin endpoint (`POST /admin/schemas`). The registry stores shapes for
/// consumers — it never validates record writes (`spec.md` §1 Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaDefinition {
    #[serde(rename = "schemaHash")]
    pub schema_hash: String,
    pub name: String,
    pub description: Option<String>,
    pub version: i64,
    pub fields: Vec<SchemaFieldSpec>,
    pub metadata: Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Payload accepted by the admin schema registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRegistration {
    #[serde(rename = "schemaHash")]
    pub schema_hash: String,
    pub name: String,
    pub description: Option<String>,
    pub version: i64,
    pub fields: Vec<SchemaFieldSpec>,
    #[serde(default)]
    pub metadata: Value,
}
