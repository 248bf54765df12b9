//! Route handlers (`spec.md` §6 HTTP surface).
//!
//! Each handler is a thin adapter: extract/validate the HTTP-specific
//! shape, call into `metastore-core`, and render the response envelope.
//! No business logic lives here — that's `RecordService`'s job.

pub mod admin;
pub mod audit;
pub mod bulk;
pub mod namespaces;
pub mod ops;
pub mod records;
pub mod schemas;
pub mod search;
pub mod stream;

use serde_json::{Map, Value};

/// Keep only the requested top-level keys of a serialized record, for
/// search's `projection`/`summary` option (`spec.md` §4.A). Projection is
/// purely a response-shaping concern; the store always returns full rows.
pub fn project(value: Value, fields: &Option<Vec<String>>) -> Value {
    let Some(fields) = fields else { return value };
    let Value::Object(obj) = value else { return value };
    let mut projected = Map::new();
    for field in fields {
        if let Some(v) = obj.get(field) {
            projected.insert(field.clone(), v.clone());
        }
    }
    Value::Object(projected)
}
