//! Integration tests driving the router directly with `tower::ServiceExt`,
//! the way a real HTTP client would, over an `InMemoryStore` instead of
//! Postgres.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use metastore_core::config::{FilestoreTransport, PoolSettings, Settings};
use metastore_core::db::{InMemoryStore, MetastoreStore};
use metastore_core::events::{LazyBusPublisher, NullBusPublisher, StreamHub};
use metastore_core::filestore::HealthTracker;
use metastore_core::models::token::{TokenKind, TokenNamespaces, TokenRecord, WildcardMarker};
use metastore_core::services::{NamespaceSummaryCache, RecordService, SchemaCache, SchemaCacheConfig, TokenIndex};

use metastore_server::state::AppState;

fn settings() -> Settings {
    Settings {
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        database_url: "postgres://unused/test".to_string(),
        pg_schema: None,
        pool: PoolSettings::default(),
        auth_disabled: false,
        tokens_json: None,
        tokens_path: None,
        metrics_enabled: true,
        search_presets_json: None,
        search_presets_path: None,
        filestore_sync_enabled: false,
        filestore_transport: FilestoreTransport::Disabled,
        filestore_allow_inline: false,
        filestore_events_channel: "filestore.events".to_string(),
        filestore_namespace: "filestore".to_string(),
        filestore_stall_threshold: std::time::Duration::from_secs(120),
    }
}

fn test_state() -> AppState {
    let store: Arc<dyn MetastoreStore> = Arc::new(InMemoryStore::new());
    let stream_hub = StreamHub::new();
    let bus = Arc::new(LazyBusPublisher::new(|| async {
        Ok(Arc::new(NullBusPublisher) as Arc<dyn metastore_core::events::BusPublisher>)
    }));
    let records = Arc::new(RecordService::new(store.clone(), stream_hub.clone(), bus));

    struct Loader(Arc<dyn MetastoreStore>);
    #[async_trait::async_trait]
    impl metastore_core::services::SchemaLoader for Loader {
        async fn load(
            &self,
            hash: &str,
        ) -> Result<Option<metastore_core::models::schema::SchemaDefinition>, metastore_core::db::RepositoryError> {
            self.0.get_schema(hash).await
        }
    }
    let schema_config = SchemaCacheConfig::new(
        std::time::Duration::from_secs(300),
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(30),
        None,
    );
    let schemas = SchemaCache::new(Arc::new(Loader(store.clone())), schema_config);

    let namespaces = Arc::new(NamespaceSummaryCache::new(store.clone()));

    let token = TokenRecord {
        token: "test-token".to_string(),
        subject: "tester".to_string(),
        kind: TokenKind::Service,
        scopes: vec![
            "metastore:read".to_string(),
            "metastore:write".to_string(),
            "metastore:delete".to_string(),
            "metastore:admin".to_string(),
        ],
        namespaces: TokenNamespaces::Wildcard(WildcardMarker),
    };
    let tokens = Arc::new(TokenIndex::new(vec![token]));

    let filestore_health = Arc::new(HealthTracker::new(false, false, std::time::Duration::from_secs(120)));

    AppState {
        store,
        records,
        schemas,
        namespaces,
        tokens,
        stream_hub,
        filestore: None,
        filestore_health,
        settings: Arc::new(settings()),
    }
}

fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header("Authorization", "Bearer test-token")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_then_fetch_round_trips_a_record() {
    let router = metastore_server::routes::build(test_state());

    let create_body = json!({
        "namespace": "analytics",
        "key": "pipeline-1",
        "metadata": {"owner": "team-a"},
        "tags": ["prod"],
    });
    let request = authed(Request::builder().method("POST").uri("/records"))
        .header("content-type", "application/json")
        .body(Body::from(create_body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["created"], json!(true));
    assert_eq!(body["record"]["namespace"], json!("analytics"));

    let request = authed(Request::builder().method("GET").uri("/records/analytics/pipeline-1"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["record"]["key"], json!("pipeline-1"));
    assert_eq!(body["record"]["version"], json!(1));
}

#[tokio::test]
async fn create_is_idempotent_against_a_live_record() {
    let router = metastore_server::routes::build(test_state());
    let create_body = json!({
        "namespace": "analytics",
        "key": "pipeline-2",
        "metadata": {},
        "tags": [],
    });

    for expected_created in [true, false] {
        let request = authed(Request::builder().method("POST").uri("/records"))
            .header("content-type", "application/json")
            .body(Body::from(create_body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), if expected_created { StatusCode::CREATED } else { StatusCode::OK });
        let body = body_json(response).await;
        assert_eq!(body["created"], json!(expected_created));
    }
}

#[tokio::test]
async fn fetch_missing_record_is_404() {
    let router = metastore_server::routes::build(test_state());
    let request = authed(Request::builder().method("GET").uri("/records/analytics/missing"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("not_found"));
}

#[tokio::test]
async fn missing_bearer_token_is_401() {
    let router = metastore_server::routes::build(test_state());
    let request = Request::builder()
        .method("GET")
        .uri("/records/analytics/pipeline-1")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn patch_clears_owner_with_explicit_null() {
    let router = metastore_server::routes::build(test_state());
    let create_body = json!({
        "namespace": "analytics",
        "key": "pipeline-3",
        "metadata": {},
        "tags": [],
        "owner": "team-a",
    });
    let request = authed(Request::builder().method("POST").uri("/records"))
        .header("content-type", "application/json")
        .body(Body::from(create_body.to_string()))
        .unwrap();
    router.clone().oneshot(request).await.unwrap();

    let patch_body = json!({ "owner": null });
    let request = authed(Request::builder().method("PATCH").uri("/records/analytics/pipeline-3"))
        .header("content-type", "application/json")
        .body(Body::from(patch_body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["record"]["owner"], Value::Null);
}

#[tokio::test]
async fn delete_then_search_excludes_soft_deleted_by_default() {
    let router = metastore_server::routes::build(test_state());
    let create_body = json!({
        "namespace": "analytics",
        "key": "pipeline-4",
        "metadata": {},
        "tags": [],
    });
    let request = authed(Request::builder().method("POST").uri("/records"))
        .header("content-type", "application/json")
        .body(Body::from(create_body.to_string()))
        .unwrap();
    router.clone().oneshot(request).await.unwrap();

    let request = authed(Request::builder().method("DELETE").uri("/records/analytics/pipeline-4"))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let search_body = json!({ "namespace": "analytics" });
    let request = authed(Request::builder().method("POST").uri("/records/search"))
        .header("content-type", "application/json")
        .body(Body::from(search_body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let body = body_json(response).await;
    let keys: Vec<&str> = body["records"].as_array().unwrap().iter().map(|r| r["key"].as_str().unwrap()).collect();
    assert!(!keys.contains(&"pipeline-4"));
}

#[tokio::test]
async fn bulk_upsert_reports_per_operation_outcomes() {
    let router = metastore_server::routes::build(test_state());
    let bulk_body = json!({
        "mode": "continueOnError",
        "operations": [
            {"type": "upsert", "namespace": "analytics", "key": "bulk-1", "metadata": {}, "tags": []},
            {"type": "upsert", "namespace": "analytics", "key": "bulk-2", "metadata": {}, "tags": []},
        ],
    });
    let request = authed(Request::builder().method("POST").uri("/records/bulk"))
        .header("content-type", "application/json")
        .body(Body::from(bulk_body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let ops = body["operations"].as_array().unwrap();
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().all(|op| op["status"] == json!("ok")));
}

#[tokio::test]
async fn healthz_and_metrics_are_reachable_without_auth() {
    let router = metastore_server::routes::build(test_state());
    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn scope_enforcement_blocks_delete_without_scope() {
    let state = test_state();
    let read_only = TokenRecord {
        token: "read-only".to_string(),
        subject: "readonly-service".to_string(),
        kind: TokenKind::Service,
        scopes: vec!["metastore:read".to_string()],
        namespaces: TokenNamespaces::Wildcard(WildcardMarker),
    };
    state.tokens.reload(vec![read_only]);
    let router = metastore_server::routes::build(state);

    let request = Request::builder()
        .method("DELETE")
        .uri("/records/analytics/pipeline-1")
        .header("Authorization", "Bearer read-only")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
