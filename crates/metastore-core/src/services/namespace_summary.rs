//! Namespace summary (`spec.md` §4.I).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::db::{MetastoreStore, NamespaceStats, RepositoryError};
use crate::models::token::NamespaceScope;
use crate::services::metrics::{NAMESPACE_DELETED_RECORDS, NAMESPACE_RECORDS};

const CACHE_TTL: Duration = Duration::from_secs(30);
const MAX_PAGE_LIMIT: i64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ScopeKey {
    All,
    Allowed(Vec<String>),
}

impl From<&NamespaceScope> for ScopeKey {
    fn from(scope: &NamespaceScope) -> Self {
        match scope {
            NamespaceScope::All => ScopeKey::All,
            NamespaceScope::Allowed(set) => {
                let mut namespaces: Vec<String> = set.iter().cloned().collect();
                namespaces.sort();
                ScopeKey::Allowed(namespaces)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    scope: ScopeKey,
    prefix: Option<String>,
    limit: i64,
    offset: i64,
}

#[derive(Clone)]
struct CachedPage {
    stats: Vec<NamespaceStats>,
    total: i64,
    expires_at: Instant,
}

/// Caches `listNamespaces` pages for 30s keyed by `(scope, prefix, limit,
/// offset)`, and opportunistically refreshes the `namespace_records` /
/// `namespace_deleted_records` gauges when a caller asks for the
/// unscoped, unfiltered first page (`spec.md` §4.I).
pub struct NamespaceSummaryCache {
    store: Arc<dyn MetastoreStore>,
    entries: Mutex<HashMap<CacheKey, CachedPage>>,
}

impl NamespaceSummaryCache {
    pub fn new(store: Arc<dyn MetastoreStore>) -> Self {
        NamespaceSummaryCache {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn list_namespaces(
        &self,
        scope: &NamespaceScope,
        prefix: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<NamespaceStats>, i64), RepositoryError> {
        if scope.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let key = CacheKey {
            scope: ScopeKey::from(scope),
            prefix: prefix.map(str::to_string),
            limit,
            offset,
        };

        let page = match self.get_cached(&key).await {
            Some(page) => page,
            None => {
                let (stats, total) = self.store.namespace_stats(scope, prefix, limit, offset).await?;
                self.store_cached(key, stats, total).await
            }
        };

        self.maybe_refresh_gauges(scope, prefix, offset).await?;
        Ok((page.stats, page.total))
    }

    async fn maybe_refresh_gauges(
        &self,
        scope: &NamespaceScope,
        prefix: Option<&str>,
        offset: i64,
    ) -> Result<(), RepositoryError> {
        if !matches!(scope, NamespaceScope::All) || prefix.is_some() || offset != 0 {
            return Ok(());
        }

        let gauge_key = CacheKey {
            scope: ScopeKey::All,
            prefix: None,
            limit: MAX_PAGE_LIMIT,
            offset: 0,
        };

        let page = match self.get_cached(&gauge_key).await {
            Some(page) => page,
            None => {
                let (stats, total) = self
                    .store
                    .namespace_stats(&NamespaceScope::All, None, MAX_PAGE_LIMIT, 0)
                    .await?;
                self.store_cached(gauge_key, stats, total).await
            }
        };

        for stat in &page.stats {
            NAMESPACE_RECORDS.with_label_values(&[&stat.namespace]).set(stat.total_records);
            NAMESPACE_DELETED_RECORDS
                .with_label_values(&[&stat.namespace])
                .set(stat.deleted_records);
        }
        Ok(())
    }

    async fn get_cached(&self, key: &CacheKey) -> Option<CachedPage> {
        let entries = self.entries.lock().await;
        let page = entries.get(key)?;
        (Instant::now() < page.expires_at).then(|| page.clone())
    }

    async fn store_cached(&self, key: CacheKey, stats: Vec<NamespaceStats>, total: i64) -> CachedPage {
        let page = CachedPage {
            stats,
            total,
            expires_at: Instant::now() + CACHE_TTL,
        };
        self.entries.lock().await.insert(key, page.clone());
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::record::NewRecordInput;
    use serde_json::json;

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_record(
                "analytics",
                "pipeline-1",
                NewRecordInput {
                    metadata: json!({}),
                    tags: vec![],
                    owner: Some("alice".to_string()),
                    schema_hash: None,
                },
                None,
            )
            .await
            .unwrap();
        store
            .create_record(
                "analytics",
                "pipeline-2",
                NewRecordInput {
                    metadata: json!({}),
                    tags: vec![],
                    owner: Some("bob".to_string()),
                    schema_hash: None,
                },
                None,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn empty_scope_returns_empty_page_without_querying() {
        let store = seeded_store().await;
        let cache = NamespaceSummaryCache::new(store);
        let scope = NamespaceScope::Allowed(Default::default());
        let (stats, total) = cache.list_namespaces(&scope, None, 50, 0).await.unwrap();
        assert!(stats.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn repeated_lookup_within_ttl_serves_cached_page() {
        let store = seeded_store().await;
        let cache = NamespaceSummaryCache::new(store.clone());
        let (first, _) = cache.list_namespaces(&NamespaceScope::All, None, 50, 0).await.unwrap();

        store
            .create_record(
                "operations",
                "job-1",
                NewRecordInput::default(),
                None,
            )
            .await
            .unwrap();

        let (second, _) = cache.list_namespaces(&NamespaceScope::All, None, 50, 0).await.unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[tokio::test]
    async fn unscoped_unfiltered_first_page_refreshes_gauges() {
        let store = seeded_store().await;
        let cache = NamespaceSummaryCache::new(store);
        let (stats, _) = cache.list_namespaces(&NamespaceScope::All, None, 50, 0).await.unwrap();
        let analytics = stats.iter().find(|s| s.namespace == "analytics").unwrap();
        assert_eq!(
            NAMESPACE_RECORDS.with_label_values(&["analytics"]).get(),
            analytics.total_records
        );
    }
}
