//! Server-sent event framing (`spec.md` §4.E).
//!
//! This crate has no opinion on the HTTP transport — `metastore-server`
//! wraps the strings produced here in whatever `axum::response::sse::Event`
//! (or equivalent) the handler needs. What lives here is the part the
//! spec actually constrains: frame shape, the connect/heartbeat framing,
//! and the bounded-queue-plus-token-bucket rate limiting so one slow SSE
//! client can't grow memory without bound.

use std::time::{Duration, Instant};

use super::stream_hub::Subscription;
use super::types::StreamEvent;

/// `retry:` hint sent once at connect time.
pub const RETRY_MS: u64 = 5000;

/// Heartbeat cadence — a `:ping` comment line keeps idle connections and
/// the proxies in front of them from timing out.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const BUCKET_CAPACITY: f64 = 200.0;
const REFILL_PER_SEC: f64 = 200.0;

/// Token bucket bounding how many data frames a single connection can be
/// sent per second. Refill is computed lazily from elapsed wall time
/// rather than a background tick, so an idle dispatcher costs nothing.
struct RateLimiter {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new() -> Self {
        RateLimiter {
            tokens: BUCKET_CAPACITY,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * REFILL_PER_SEC).min(BUCKET_CAPACITY);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Renders the initial two frames a fresh connection sends before any
/// record event: the `retry:` hint and the `:connected` comment.
pub fn connect_frames() -> String {
    format!("retry: {RETRY_MS}\n\n:connected\n\n")
}

/// Renders a heartbeat comment frame.
pub fn heartbeat_frame() -> &'static str {
    ":ping\n\n"
}

fn format_event_frame(event: &StreamEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "null".to_string());
    format!("event: {}\nid: {}\ndata: {}\n\n", event.topic(), event.id, data)
}

fn format_drop_comment(dropped: u64) -> String {
    format!(": rate_limited {dropped} events trimmed\n\n")
}

/// Drives one subscriber's frame stream: pulls events off its
/// [`Subscription`], applies the token bucket, and — when the bucket has
/// been starving the connection — emits a single drop-accounting comment
/// frame ahead of the next data frame, never in the middle of one.
pub struct SseDispatcher {
    subscription: Subscription,
    limiter: RateLimiter,
    dropped: u64,
    pending_data_frame: Option<String>,
}

impl SseDispatcher {
    pub fn new(subscription: Subscription) -> Self {
        SseDispatcher {
            subscription,
            limiter: RateLimiter::new(),
            dropped: 0,
            pending_data_frame: None,
        }
    }

    /// Returns the next frame to write to the connection, or `None` once
    /// the hub has shut down and no more events will ever arrive.
    pub async fn next_frame(&mut self) -> Option<String> {
        if let Some(frame) = self.pending_data_frame.take() {
            return Some(frame);
        }
        loop {
            let event = self.subscription.recv().await?;
            if !self.limiter.try_acquire() {
                self.dropped += 1;
                continue;
            }
            let frame = format_event_frame(&event);
            if self.dropped > 0 {
                let comment = format_drop_comment(self.dropped);
                self.dropped = 0;
                self.pending_data_frame = Some(frame);
                return Some(comment);
            }
            return Some(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::stream_hub::{StreamHub, Transport};
    use crate::events::types::{PendingMutation, StreamAction};
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

    #[test]
    fn connect_frame_carries_retry_hint() {
        let frame = connect_frames();
        assert!(frame.starts_with("retry: 5000"));
        assert!(frame.contains(":connected"));
    }

    #[tokio::test]
    async fn dispatcher_emits_data_frames_for_published_events() {
        let hub = StreamHub::new();
        let sub = hub.subscribe(Transport::Sse);
        let mut dispatcher = SseDispatcher::new(sub);

        hub.publish(PendingMutation {
            action: StreamAction::Created,
            record: sample_record(1),
            actor: None,
            mode: None,
            restored_from: None,
        });

        let frame = dispatcher.next_frame().await.unwrap();
        assert!(frame.starts_with("event: metastore.record.created"));
        assert!(frame.contains("\nid: "));
        assert!(frame.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn exhausted_bucket_drops_events_and_reports_once() {
        let hub = StreamHub::new();
        let sub = hub.subscribe(Transport::Sse);
        let mut dispatcher = SseDispatcher::new(sub);
        dispatcher.limiter.tokens = 1.0;
        dispatcher.limiter.last_refill = Instant::now();

        for v in 1..=3 {
            hub.publish(PendingMutation {
                action: StreamAction::Updated,
                record: sample_record(v),
                actor: None,
                mode: None,
                restored_from: None,
            });
        }

        let first = dispatcher.next_frame().await.unwrap();
        assert!(first.starts_with(": rate_limited"));
        assert!(first.contains("1 events trimmed"));

        let second = dispatcher.next_frame().await.unwrap();
        assert!(second.starts_with("event: metastore.record.updated"));
    }
}
