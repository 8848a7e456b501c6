// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /api/news (valid + malformed batch)
// - POST /api/news/update
// - POST /api/news/load (filtering + 400 on bad batch)
// - DELETE /api/news, DELETE /api/news/{pk}

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use news_injector::api::{self, AppState};
use news_injector::{FeedStore, MemoryStore, NewsConfig, NewsInjector};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

const BATCH: &str = r#"[
  {"pk": 3, "publish_to": null, "title": "native", "url": "a"},
  {"pk": 10000001, "publish_to": null, "title": "one", "url": "b"},
  {"pk": 10000002, "publish_to": 17073748, "title": "expired", "url": "c"},
  {"pk": 10000003, "publish_to": null, "title": "first", "url": "d"},
  {"pk": 10000003, "publish_to": null, "title": "second", "url": "e"}
]"#;

/// Fresh state per test: each router owns its own memory store.
fn test_router() -> Router {
    let store: Arc<dyn FeedStore> = Arc::new(MemoryStore::new());
    let injector = NewsInjector::new(store, &NewsConfig::default()).expect("injector");
    api::router(AppState::new(injector))
}

async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("router response");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, String::from_utf8(bytes).expect("utf8"))
}

async fn list(app: &Router) -> Vec<Json> {
    let (status, body) = send(app, "GET", "/api/news", "").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_str(&body).expect("items json");
    v.as_array().cloned().expect("items array")
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_router();
    let (status, body) = send(&app, "GET", "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.trim(), "ok");
}

#[tokio::test]
async fn add_then_update_collapses_duplicates() {
    let app = test_router();
    let item = r#"[{"pk": 4, "publish_to": 2557073748, "title": "t", "url": "bla"}]"#;

    let (status, body) = send(&app, "POST", "/api/news", item).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v["items"], 1);

    send(&app, "POST", "/api/news", item).await;
    assert_eq!(list(&app).await.len(), 2);

    let (status, body) = send(&app, "POST", "/api/news/update", "").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v.as_array().map(Vec::len), Some(1));
    assert_eq!(v[0]["key"], 4);
    assert_eq!(v[0]["link"], "bla");
}

#[tokio::test]
async fn malformed_add_is_accepted_and_ignored() {
    let app = test_router();
    let (status, body) = send(&app, "POST", "/api/news", "thisisnotvalidjson[").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v["items"], 0);
    assert!(list(&app).await.is_empty());
}

#[tokio::test]
async fn load_filters_offset_expiry_and_duplicates() {
    let app = test_router();
    let (status, body) = send(&app, "POST", "/api/news/load", BATCH).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v["loaded"], true);
    assert_eq!(v["items"], 2);

    let items = list(&app).await;
    assert_eq!(items[0]["key"], 10000001);
    assert_eq!(items[1]["key"], 10000003);
    assert_eq!(items[1]["title"], "second");
}

#[tokio::test]
async fn load_rejects_unparseable_batch() {
    let app = test_router();
    let (status, body) = send(&app, "POST", "/api/news/load", "[{\"pk\":").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("error"));
}

#[tokio::test]
async fn dismiss_and_clear() {
    let app = test_router();
    send(&app, "POST", "/api/news/load", BATCH).await;

    let (status, _) = send(&app, "DELETE", "/api/news/10000001", "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", "/api/news/10000001", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(list(&app).await.len(), 1);

    let (status, _) = send(&app, "DELETE", "/api/news", "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(list(&app).await.is_empty());
}
