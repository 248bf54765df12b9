//! In-process stream hub (`spec.md` §4.E, §9 ownership notes).
//!
//! One broadcast sender fans lifecycle events out to every subscriber, so
//! emission order is the hub's order — "a single emitter ensures events
//! arrive to subscribers in emission order" (`spec.md` §4.E). Each
//! subscriber gets its own lagging `broadcast::Receiver`; a slow consumer
//! only drops frames from its own queue; it never blocks another
//! subscriber or the publisher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::broadcast;

use super::types::{PendingMutation, StreamEvent};

/// The transport a subscription was opened over, for the per-transport
/// gauges `spec.md` §4.E calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Sse,
    WebSocket,
}

/// Default broadcast channel depth. Individual dispatchers (SSE) layer
/// their own bounded queue and rate limiting on top; this just needs to be
/// large enough that a momentarily slow subscriber doesn't lag behind a
/// burst of unrelated-record writes.
const CHANNEL_CAPACITY: usize = 4096;

struct Counters {
    sse: AtomicU64,
    websocket: AtomicU64,
}

/// The process-wide lifecycle event publisher (`spec.md` §4.E). Construct
/// once behind an `Arc` and share it between the record service and every
/// HTTP stream handler.
pub struct StreamHub {
    sender: broadcast::Sender<Arc<StreamEvent>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl StreamHub {
    pub fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(StreamHub {
            sender,
            next_id: AtomicU64::new(1),
            counters: Counters {
                sse: AtomicU64::new(0),
                websocket: AtomicU64::new(0),
            },
        })
    }

    /// Open a subscription. The returned handle decrements the relevant
    /// gauge when dropped.
    pub fn subscribe(self: &Arc<Self>, transport: Transport) -> Subscription {
        let counter = match transport {
            Transport::Sse => &self.counters.sse,
            Transport::WebSocket => &self.counters.websocket,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        Subscription {
            transport,
            receiver: self.sender.subscribe(),
            hub: Arc::downgrade(self),
        }
    }

    /// Assign the next monotonic event id and broadcast the event. A
    /// result of `Err` just means there were no subscribers at the
    /// moment — never an error condition for the caller (`spec.md` §4.F
    /// treats publish failures as non-fatal; the in-process hub has no
    /// failure mode besides "nobody is listening").
    pub fn publish(&self, mutation: PendingMutation) -> StreamEvent {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = mutation.into_stream_event(id);
        let _ = self.sender.send(Arc::new(event.clone()));
        event
    }

    pub fn subscriber_count(&self, transport: Transport) -> u64 {
        match transport {
            Transport::Sse => self.counters.sse.load(Ordering::SeqCst),
            Transport::WebSocket => self.counters.websocket.load(Ordering::SeqCst),
        }
    }

    pub fn total_subscribers(&self) -> u64 {
        self.subscriber_count(Transport::Sse) + self.subscriber_count(Transport::WebSocket)
    }
}

/// An open subscription. Holds only a weak reference back to the hub
/// (`spec.md` §9 — "no ownership cycles"); dropping it unsubscribes.
pub struct Subscription {
    transport: Transport,
    receiver: broadcast::Receiver<Arc<StreamEvent>>,
    hub: Weak<StreamHub>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Arc<StreamEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let counter = match self.transport {
                Transport::Sse => &hub.counters.sse,
                Transport::WebSocket => &hub.counters.websocket,
            };
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::StreamAction;
    use crate::models::record::Record;
    use chrono::Utc;

    fn sample_record(version: i64) -> Record {
        Record {
            namespace: "analytics".into(),
            key: "pipeline-1".into(),
            metadata: serde_json::json!({}),
            tags: vec![],
            owner: None,
            schema_hash: None,
            version,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            created_by: None,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_emission_order() {
        let hub = StreamHub::new();
        let mut sub = hub.subscribe(Transport::Sse);
        assert_eq!(hub.subscriber_count(Transport::Sse), 1);

        hub.publish(PendingMutation {
            action: StreamAction::Created,
            record: sample_record(1),
            actor: None,
            mode: None,
            restored_from: None,
        });
        hub.publish(PendingMutation {
            action: StreamAction::Updated,
            record: sample_record(2),
            actor: None,
            mode: None,
            restored_from: None,
        });

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert!(first.id < second.id);
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn dropping_subscription_decrements_gauge() {
        let hub = StreamHub::new();
        {
            let _sub = hub.subscribe(Transport::WebSocket);
            assert_eq!(hub.subscriber_count(Transport::WebSocket), 1);
        }
        assert_eq!(hub.subscriber_count(Transport::WebSocket), 0);
    }
}
