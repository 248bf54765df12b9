//! Event envelopes emitted on the commit path (`spec.md` §4.D.4, §4.E).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::record::Record;

/// The lifecycle action a [`StreamEvent`]/[`BusPayload`] reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamAction {
    Created,
    Updated,
    Deleted,
}

impl StreamAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamAction::Created => "created",
            StreamAction::Updated => "updated",
            StreamAction::Deleted => "deleted",
        }
    }
}

/// The mode a bulk write was executed under, carried through to
/// subscribers so they can distinguish a single write from a batch leg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BulkMode {
    Atomic,
    ContinueOnError,
}

/// A lifecycle event handed to the stream hub after a transaction commits
/// (`spec.md` §4.D.3 — events are only ever emitted post-commit).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    /// Assigned by the hub at emission time; monotonic across the process.
    pub id: u64,
    pub action: StreamAction,
    pub namespace: String,
    pub key: String,
    pub version: i64,
    #[serde(rename = "occurredAt")]
    pub occurred_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "deletedAt")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BulkMode>,
}

impl StreamEvent {
    /// Event topic used for SSE's `event:` line and the websocket envelope
    /// `type` (`spec.md` §4.E): `metastore.record.<action>`.
    pub fn topic(&self) -> String {
        format!("metastore.record.{}", self.action.as_str())
    }
}

/// The payload handed to the durable bus publisher (`spec.md` §4.D.4,
/// §4.F) — carries the full record rather than just the delta, since
/// external consumers don't have read access back into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusPayload {
    pub namespace: String,
    pub key: String,
    pub actor: Option<String>,
    pub record: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BulkMode>,
    #[serde(rename = "restoredFrom", default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<i64>,
}

/// A pending mutation collected during a transaction and turned into a
/// [`StreamEvent`]/[`BusPayload`] pair only after commit (`spec.md`
/// §4.D.3).
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub action: StreamAction,
    pub record: Record,
    pub actor: Option<String>,
    pub mode: Option<BulkMode>,
    pub restored_from: Option<i64>,
}

impl PendingMutation {
    pub fn into_stream_event(self, id: u64) -> StreamEvent {
        StreamEvent {
            id,
            action: self.action,
            namespace: self.record.namespace.clone(),
            key: self.record.key.clone(),
            version: self.record.version,
            occurred_at: Utc::now(),
            updated_at: self.record.updated_at,
            deleted_at: self.record.deleted_at,
            actor: self.actor.clone(),
            mode: self.mode,
        }
    }

    pub fn into_bus_payload(self) -> BusPayload {
        BusPayload {
            namespace: self.record.namespace.clone(),
            key: self.record.key.clone(),
            actor: self.actor,
            mode: self.mode,
            restored_from: self.restored_from,
            record: self.record,
        }
    }
}

/// The websocket connect acknowledgement (`spec.md` §4.E).
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionAck {
    #[serde(rename = "occurredAt")]
    pub occurred_at: DateTime<Utc>,
}

/// Wraps a value with its websocket envelope discriminator.
#[derive(Debug, Clone, Serialize)]
pub struct WsEnvelope<T: Serialize> {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Option<u64>,
    pub data: T,
}

impl WsEnvelope<Value> {
    pub fn for_event(event: &StreamEvent) -> Self {
        WsEnvelope {
            kind: event.topic(),
            id: Some(event.id),
            data: serde_json::to_value(event).unwrap_or(Value::Null),
        }
    }

    pub fn connection_ack() -> Self {
        WsEnvelope {
            kind: "connection.ack".to_string(),
            id: None,
            data: serde_json::to_value(ConnectionAck { occurred_at: Utc::now() }).unwrap_or(Value::Null),
        }
    }
}
