//! Lifecycle event fan-out (`spec.md` §4.E, §4.F).
//!
//! [`stream_hub`] is the in-process broadcast hub the record service feeds
//! after every commit. [`sse`] frames those events for long-lived SSE
//! connections. [`bus_publisher`] forwards them, best-effort, to a durable
//! external transport. None of this module talks to a specific HTTP
//! framework or message broker — those seams are filled in by
//! `metastore-server`.

pub mod bus_publisher;
pub mod sse;
pub mod stream_hub;
pub mod types;

pub use bus_publisher::{BusPublisher, LazyBusPublisher, NullBusPublisher, PublishError};
pub use sse::SseDispatcher;
pub use stream_hub::{StreamHub, Subscription, Transport};
pub use types::{BulkMode, BusPayload, ConnectionAck, PendingMutation, StreamAction, StreamEvent, WsEnvelope};

use thiserror::Error;

/// Errors that can arise while wiring a subscriber up to the hub — kept
/// distinct from [`PublishError`], which is about the outbound bus side.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("subscription closed")]
    Closed,
}
