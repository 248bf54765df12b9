//! Durable external event publisher (`spec.md` §4.F).
//!
//! The bus is best-effort from the record service's point of view: a
//! publish failure is logged and swallowed, never propagated back to the
//! HTTP caller whose write already committed. The concrete transport
//! (redis, a message broker, whatever `metastore-server` is configured
//! with) lives outside this crate — [`BusPublisher`] is the seam.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::types::BusPayload;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("bus transport unavailable: {0}")]
    Unavailable(String),
    #[error("bus publish failed: {0}")]
    Failed(String),
}

/// A durable external sink for committed record mutations.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(&self, payload: &BusPayload) -> Result<(), PublishError>;
    async fn close(&self);
}

/// A publisher that accepts everything and keeps nothing — used when
/// `METASTORE_FILESTORE_SYNC_ENABLED` style bus wiring is off, and as the
/// default in tests.
pub struct NullBusPublisher;

#[async_trait]
impl BusPublisher for NullBusPublisher {
    async fn publish(&self, _payload: &BusPayload) -> Result<(), PublishError> {
        Ok(())
    }

    async fn close(&self) {}
}

type Factory = Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<Arc<dyn BusPublisher>, PublishError>> + Send>> + Send + Sync>;

/// Wraps a transport factory so the real connection is only opened on the
/// first publish attempt, not at startup — a misconfigured or briefly
/// unreachable bus shouldn't block the service from accepting writes.
pub struct LazyBusPublisher {
    factory: Factory,
    inner: OnceCell<Arc<dyn BusPublisher>>,
}

impl LazyBusPublisher {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn BusPublisher>, PublishError>> + Send + 'static,
    {
        LazyBusPublisher {
            factory: Box::new(move || Box::pin(factory())),
            inner: OnceCell::new(),
        }
    }

    async fn get(&self) -> Option<&Arc<dyn BusPublisher>> {
        self.inner
            .get_or_try_init(|| (self.factory)())
            .await
            .map_err(|err| tracing::warn!(error = %err, "bus publisher unavailable, dropping event"))
            .ok()
    }

    /// Publish best-effort: any failure (including failing to establish
    /// the underlying connection) is logged and swallowed.
    pub async fn publish_best_effort(&self, payload: &BusPayload) {
        match self.get().await {
            Some(publisher) => {
                if let Err(err) = publisher.publish(payload).await {
                    tracing::warn!(
                        namespace = %payload.namespace,
                        key = %payload.key,
                        error = %err,
                        "bus publish failed"
                    );
                }
            }
            None => {
                tracing::warn!(
                    namespace = %payload.namespace,
                    key = %payload.key,
                    "bus publish skipped, no transport available"
                );
            }
        }
    }

    pub async fn close(&self) {
        if let Some(publisher) = self.inner.get() {
            publisher.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPublisher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BusPublisher for CountingPublisher {
        async fn publish(&self, _payload: &BusPayload) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) {}
    }

    fn sample_payload() -> BusPayload {
        use crate::models::record::Record;
        use chrono::Utc;
        BusPayload {
            namespace: "analytics".into(),
            key: "pipeline-1".into(),
            actor: None,
            mode: None,
            restored_from: None,
            record: Record {
                namespace: "analytics".into(),
                key: "pipeline-1".into(),
                metadata: serde_json::json!({}),
                tags: vec![],
                owner: None,
                schema_hash: None,
                version: 1,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                deleted_at: None,
                created_by: None,
                updated_by: None,
            },
        }
    }

    #[tokio::test]
    async fn factory_is_invoked_lazily_and_only_once() {
        let build_calls = Arc::new(AtomicUsize::new(0));
        let publish_calls = Arc::new(AtomicUsize::new(0));

        let build_calls_clone = build_calls.clone();
        let publish_calls_clone = publish_calls.clone();
        let lazy = LazyBusPublisher::new(move || {
            build_calls_clone.fetch_add(1, Ordering::SeqCst);
            let calls = publish_calls_clone.clone();
            async move { Ok(Arc::new(CountingPublisher { calls }) as Arc<dyn BusPublisher>) }
        });

        assert_eq!(build_calls.load(Ordering::SeqCst), 0);

        lazy.publish_best_effort(&sample_payload()).await;
        lazy.publish_best_effort(&sample_payload()).await;

        assert_eq!(build_calls.load(Ordering::SeqCst), 1);
        assert_eq!(publish_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_build_is_swallowed() {
        let lazy: LazyBusPublisher = LazyBusPublisher::new(|| async {
            Err(PublishError::Unavailable("connection refused".into()))
        });
        lazy.publish_best_effort(&sample_payload()).await;
    }

    #[tokio::test]
    async fn null_publisher_accepts_everything() {
        let publisher = NullBusPublisher;
        assert!(publisher.publish(&sample_payload()).await.is_ok());
        publisher.close().await;
    }
}
