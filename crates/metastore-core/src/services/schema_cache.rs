//! Schema registry cache (`spec.md` §4.H).
//!
//! A process-wide map from `schemaHash` to either a positive hit or a
//! negative miss, each with its own expiry. Lookups that land on a stale
//! hit still serve the cached value and kick off a single-flight
//! background refresh; lookups on a cold or expired key perform a
//! single-flight foreground load. A periodic scan refreshes hits ahead of
//! expiry so steady traffic rarely blocks on a foreground load at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::RepositoryError;
use crate::models::schema::SchemaDefinition;
use crate::services::metrics::{SCHEMA_CACHE_HITS_TOTAL, SCHEMA_CACHE_MISSES_TOTAL};

/// Loads a schema by hash — backed by `MetastoreStore::get_schema` in
/// production, a canned map in tests.
#[async_trait]
pub trait SchemaLoader: Send + Sync {
    async fn load(&self, hash: &str) -> Result<Option<SchemaDefinition>, RepositoryError>;
}

#[derive(Clone)]
enum Entry {
    Hit {
        value: SchemaDefinition,
        expires_at: Instant,
        refresh_at: Instant,
        refreshing: bool,
    },
    Miss {
        expires_at: Instant,
    },
}

/// Cache timing parameters (`spec.md` §4.H).
pub struct SchemaCacheConfig {
    pub ttl: Duration,
    pub refresh_ahead: Duration,
    pub refresh_interval: Duration,
    pub negative_ttl: Duration,
    pub allow_negative_cache: bool,
}

impl SchemaCacheConfig {
    /// `negativeTtl` defaults to `min(ttl, 30s)` when unset and a positive
    /// TTL exists (`spec.md` §4.H); `refreshInterval` is floored at 1s.
    pub fn new(ttl: Duration, refresh_ahead: Duration, refresh_interval: Duration, negative_ttl: Option<Duration>) -> Self {
        SchemaCacheConfig {
            ttl,
            refresh_ahead,
            refresh_interval: refresh_interval.max(Duration::from_millis(1000)),
            negative_ttl: negative_ttl.unwrap_or_else(|| ttl.min(Duration::from_secs(30))),
            allow_negative_cache: true,
        }
    }
}

#[derive(Default)]
struct Metrics {
    hits_positive: AtomicU64,
    hits_negative: AtomicU64,
    misses_cold: AtomicU64,
    misses_expired: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits_positive: u64,
    pub hits_negative: u64,
    pub misses_cold: u64,
    pub misses_expired: u64,
}

pub struct SchemaCache {
    loader: Arc<dyn SchemaLoader>,
    config: SchemaCacheConfig,
    entries: Mutex<HashMap<String, Entry>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    metrics: Metrics,
}

impl SchemaCache {
    pub fn new(loader: Arc<dyn SchemaLoader>, config: SchemaCacheConfig) -> Arc<Self> {
        Arc::new(SchemaCache {
            loader,
            config,
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            metrics: Metrics::default(),
        })
    }

    pub async fn get(self: &Arc<Self>, hash: &str) -> Result<Option<SchemaDefinition>, RepositoryError> {
        let now = Instant::now();
        let snapshot = self.entries.lock().await.get(hash).cloned();
        match snapshot {
            Some(Entry::Hit { value, expires_at, refresh_at, .. }) if now < expires_at => {
                self.metrics.hits_positive.fetch_add(1, Ordering::SeqCst);
                SCHEMA_CACHE_HITS_TOTAL.with_label_values(&["positive"]).inc();
                if now >= refresh_at && self.try_begin_refresh(hash).await {
                    self.spawn_refresh(hash.to_string());
                }
                Ok(Some(value))
            }
            Some(Entry::Miss { expires_at }) if now < expires_at => {
                self.metrics.hits_negative.fetch_add(1, Ordering::SeqCst);
                SCHEMA_CACHE_HITS_TOTAL.with_label_values(&["negative"]).inc();
                Ok(None)
            }
            Some(_) => {
                self.metrics.misses_expired.fetch_add(1, Ordering::SeqCst);
                SCHEMA_CACHE_MISSES_TOTAL.with_label_values(&["expired"]).inc();
                self.foreground_load(hash).await
            }
            None => {
                self.metrics.misses_cold.fetch_add(1, Ordering::SeqCst);
                SCHEMA_CACHE_MISSES_TOTAL.with_label_values(&["cold"]).inc();
                self.foreground_load(hash).await
            }
        }
    }

    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits_positive: self.metrics.hits_positive.load(Ordering::SeqCst),
            hits_negative: self.metrics.hits_negative.load(Ordering::SeqCst),
            misses_cold: self.metrics.misses_cold.load(Ordering::SeqCst),
            misses_expired: self.metrics.misses_expired.load(Ordering::SeqCst),
        }
    }

    /// Starts the background timer that scans for hits due a refresh.
    /// Call once at startup; the task runs for the life of the `Arc`.
    pub fn spawn_periodic_refresh(self: &Arc<Self>) {
        let cache = self.clone();
        let interval = cache.config.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cache.scan_and_refresh().await;
            }
        });
    }

    async fn scan_and_refresh(self: &Arc<Self>) {
        let now = Instant::now();
        let due: Vec<String> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .filter_map(|(key, entry)| match entry {
                    Entry::Hit { expires_at, refresh_at, refreshing, .. }
                        if now < *expires_at && now >= *refresh_at && !refreshing =>
                    {
                        Some(key.clone())
                    }
                    _ => None,
                })
                .collect()
        };
        for hash in due {
            if self.try_begin_refresh(&hash).await {
                self.spawn_refresh(hash);
            }
        }
    }

    async fn try_begin_refresh(&self, hash: &str) -> bool {
        let mut entries = self.entries.lock().await;
        if let Some(Entry::Hit { refreshing, .. }) = entries.get_mut(hash) {
            if *refreshing {
                return false;
            }
            *refreshing = true;
            return true;
        }
        false
    }

    fn spawn_refresh(self: &Arc<Self>, hash: String) {
        let cache = self.clone();
        tokio::spawn(async move { cache.refresh_now(hash).await });
    }

    async fn refresh_now(self: Arc<Self>, hash: String) {
        match self.loader.load(&hash).await {
            Ok(Some(value)) => self.store_hit(&hash, value).await,
            Ok(None) if self.config.allow_negative_cache => self.store_miss(&hash).await,
            Ok(None) => self.evict(&hash).await,
            Err(err) => {
                tracing::warn!(schema_hash = %hash, error = %err, "schema cache refresh failed, postponing expiry");
                self.postpone(&hash).await;
            }
        }
    }

    /// A failed background refresh postpones expiry rather than evicting,
    /// so transient loader failures don't cause a refresh stampede
    /// (`spec.md` §4.H).
    async fn postpone(&self, hash: &str) {
        let extension = self.config.refresh_interval.min(self.config.ttl);
        let mut entries = self.entries.lock().await;
        if let Some(Entry::Hit { expires_at, refresh_at, refreshing, .. }) = entries.get_mut(hash) {
            *expires_at += extension;
            *refresh_at = expires_at.checked_sub(self.config.refresh_ahead).unwrap_or(*expires_at);
            *refreshing = false;
        }
    }

    async fn foreground_load(&self, hash: &str) -> Result<Option<SchemaDefinition>, RepositoryError> {
        let lock = self.key_lock(hash).await;
        let _guard = lock.lock().await;

        let now = Instant::now();
        if let Some(entry) = self.entries.lock().await.get(hash) {
            match entry {
                Entry::Hit { value, expires_at, .. } if now < *expires_at => return Ok(Some(value.clone())),
                Entry::Miss { expires_at } if now < *expires_at => return Ok(None),
                _ => {}
            }
        }

        match self.loader.load(hash).await {
            Ok(Some(value)) => {
                self.store_hit(hash, value.clone()).await;
                Ok(Some(value))
            }
            Ok(None) => {
                if self.config.allow_negative_cache {
                    self.store_miss(hash).await;
                } else {
                    self.evict(hash).await;
                }
                Ok(None)
            }
            Err(err) => {
                self.evict(hash).await;
                Err(err)
            }
        }
    }

    async fn key_lock(&self, hash: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .await
            .entry(hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn store_hit(&self, hash: &str, value: SchemaDefinition) {
        let now = Instant::now();
        let expires_at = now + self.config.ttl;
        let refresh_at = expires_at.checked_sub(self.config.refresh_ahead).unwrap_or(now);
        self.entries.lock().await.insert(
            hash.to_string(),
            Entry::Hit { value, expires_at, refresh_at, refreshing: false },
        );
    }

    async fn store_miss(&self, hash: &str) {
        let expires_at = Instant::now() + self.config.negative_ttl;
        self.entries.lock().await.insert(hash.to_string(), Entry::Miss { expires_at });
    }

    async fn evict(&self, hash: &str) {
        self.entries.lock().await.remove(hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn sample(hash: &str) -> SchemaDefinition {
        SchemaDefinition {
            schema_hash: hash.to_string(),
            name: "orders".to_string(),
            description: None,
            version: 1,
            fields: vec![],
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct CountingLoader {
        calls: AtomicUsize,
        response: Option<SchemaDefinition>,
    }

    #[async_trait]
    impl SchemaLoader for CountingLoader {
        async fn load(&self, _hash: &str) -> Result<Option<SchemaDefinition>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn cold_lookup_loads_and_caches() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0), response: Some(sample("abc123")) });
        let cache = SchemaCache::new(loader.clone(), SchemaCacheConfig::new(
            Duration::from_secs(60),
            Duration::from_secs(10),
            Duration::from_secs(1),
            None,
        ));

        let first = cache.get("abc123").await.unwrap();
        let second = cache.get("abc123").await.unwrap();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics_snapshot().misses_cold, 1);
        assert_eq!(cache.metrics_snapshot().hits_positive, 1);
    }

    #[tokio::test]
    async fn miss_is_cached_negatively() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0), response: None });
        let cache = SchemaCache::new(loader.clone(), SchemaCacheConfig::new(
            Duration::from_secs(60),
            Duration::from_secs(10),
            Duration::from_secs(1),
            Some(Duration::from_secs(60)),
        ));

        assert!(cache.get("missing").await.unwrap().is_none());
        assert!(cache.get("missing").await.unwrap().is_none());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics_snapshot().hits_negative, 1);
    }

    #[tokio::test]
    async fn stale_hit_triggers_background_refresh_but_still_serves_cached_value() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0), response: Some(sample("abc123")) });
        let cache = SchemaCache::new(loader.clone(), SchemaCacheConfig::new(
            Duration::from_millis(500),
            Duration::from_millis(490),
            Duration::from_secs(1),
            None,
        ));

        let first = cache.get("abc123").await.unwrap();
        assert!(first.is_some());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = cache.get("abc123").await.unwrap();
        assert!(second.is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }
}
