//! In-process router tests

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crawlguard_core::logic::catalog_sync::PatternFetcher;
use crawlguard_core::logic::verification::StaticResolver;
use crawlguard_core::{CrawlGuard, FeedFormat, FeedSource, GuardSettings, MemoryStore, NoopSink, SharedSettings, SyncError};

use crate::config::Config;
use crate::middleware::admin::ADMIN_KEY_HEADER;
use crate::{create_router, AppState};

const ADMIN_KEY: &str = "test-admin-key";

struct FixedFetcher;

impl PatternFetcher for FixedFetcher {
    fn fetch(&self, _url: &str) -> Result<String, SyncError> {
        Ok("<?php\nreturn array(\n    'Tideline' => 'TidelineBot',\n);".to_string())
    }
}

fn test_config() -> Config {
    Config {
        database_path: PathBuf::from(":memory:"),
        port: 0,
        admin_api_key: Some(ADMIN_KEY.to_string()),
        environment: "test".to_string(),
        settings_path: None,
        sync_interval_hours: 168,
        learn_interval_hours: 24,
        dns_timeout_ms: 2000,
        fetch_timeout_secs: 30,
    }
}

fn app_with(settings: GuardSettings) -> axum::Router {
    app_with_config(settings, test_config())
}

fn app_with_config(settings: GuardSettings, config: Config) -> axum::Router {
    let guard = CrawlGuard::new(
        Arc::new(MemoryStore::new()),
        SharedSettings::new(settings),
        Arc::new(StaticResolver::new()),
        Arc::new(FixedFetcher),
        Arc::new(NoopSink),
    );
    guard.seed_builtin_catalog().unwrap();

    let sources = vec![FeedSource {
        id: "fixture".to_string(),
        name: "Fixture list".to_string(),
        url: "https://lists.test/bots.php".to_string(),
        format: FeedFormat::PhpArray,
        version: "latest".to_string(),
        enabled: true,
    }];
    create_router(AppState::new(guard, config, sources))
}

fn app() -> axum::Router {
    app_with(GuardSettings::default())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ADMIN_KEY_HEADER, ADMIN_KEY)
        .header(header::CONTENT_TYPE, "application/json");
    match body {
        Some(b) => builder.body(Body::from(b.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["active_signatures"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_detect_known_crawler() {
    let response = app()
        .oneshot(post_json("/api/v1/detect", json!({"identifier": "Mozilla/5.0 (compatible; GPTBot/1.2; +https://openai.com/gptbot)"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["is_bot"], true);
    assert_eq!(body["method"], "known_pattern");
    assert_eq!(body["bot_name"], "GPTBot");
}

#[tokio::test]
async fn test_detect_rejects_oversized_identifier() {
    let response = app()
        .oneshot(post_json("/api/v1/detect", json!({"identifier": "x".repeat(5000)})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_by_range_and_invalid_address() {
    let app = app();
    let ok = app
        .clone()
        .oneshot(post_json("/api/v1/verify", json!({"identity": "GoogleBot", "origin_address": "66.249.64.5"})))
        .await
        .unwrap();
    let body = json_body(ok).await;
    assert_eq!(body["verified"], true);
    assert_eq!(body["method"], "ip_range");

    let bad = app
        .oneshot(post_json("/api/v1/verify", json!({"identity": "GoogleBot", "origin_address": "not-an-address"})))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::OK);
    let body = json_body(bad).await;
    assert!(body["verified"].is_null());
}

#[tokio::test]
async fn test_visits_accumulate() {
    let app = app();
    for ts in [100, 400] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/visits",
                json!({"identifier": "Bingbot/2.0", "origin_address": "157.55.39.1", "path": "/docs", "timestamp": ts}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .oneshot(post_json(
            "/api/v1/visits",
            json!({"identifier": "Bingbot/2.0", "origin_address": "157.55.39.1", "path": "/blog", "timestamp": 700}),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["visit_count"], 3);
    assert_eq!(body["request_interval_avg"], 300.0);
    assert_eq!(body["unique_paths_ratio"], 0.67);
}

#[tokio::test]
async fn test_consume_returns_429_with_retry_after() {
    let app = app();
    let request = json!({"identity": "SmallBot", "origin_address": "198.51.100.20", "tier": "low"});

    for _ in 0..10 {
        let response = app.clone().oneshot(post_json("/api/v1/rate/consume", request.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let check = app.clone().oneshot(post_json("/api/v1/rate/check", request.clone())).await.unwrap();
    assert_eq!(check.status(), StatusCode::OK);
    assert_eq!(json_body(check).await["allowed"], false);

    let denied = app.oneshot(post_json("/api/v1/rate/consume", request)).await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = denied.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!(retry > 0 && retry <= 60);
    assert_eq!(json_body(denied).await["limit_type"], "minute");
}

#[tokio::test]
async fn test_blocked_identity_is_forbidden() {
    let settings = GuardSettings { blocked_identities: vec!["Bytespider".to_string()], ..GuardSettings::default() };
    let response = app_with(settings)
        .oneshot(post_json("/api/v1/rate/consume", json!({"identity": "bytespider", "origin_address": "110.249.0.1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_requires_key() {
    let app = app();
    let missing = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/admin/signatures").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/admin/signatures")
                .header(ADMIN_KEY_HEADER, "guess")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = app.oneshot(admin("GET", "/api/v1/admin/signatures", None)).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(json_body(ok).await.as_array().unwrap().len(), 13);
}

#[tokio::test]
async fn test_admin_sync_then_history() {
    let app = app();
    let response = app.clone().oneshot(admin("POST", "/api/v1/admin/sync", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body[0]["success"], true);
    assert_eq!(body[0]["summary"]["added"], 1);

    let history = app
        .clone()
        .oneshot(admin("GET", "/api/v1/admin/sync/history?source=fixture&limit=5", None))
        .await
        .unwrap();
    let body = json_body(history).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["status"], "success");

    let detected = app
        .oneshot(post_json("/api/v1/detect", json!({"identifier": "TidelineBot/0.1"})))
        .await
        .unwrap();
    assert_eq!(json_body(detected).await["bot_name"], "Tideline");
}

#[tokio::test]
async fn test_admin_unknown_and_learn() {
    let app = app();
    app.clone()
        .oneshot(post_json("/api/v1/detect", json!({"identifier": "CustomSpider/1.0"})))
        .await
        .unwrap();

    let pending = app.clone().oneshot(admin("GET", "/api/v1/admin/unknown?limit=10", None)).await.unwrap();
    let body = json_body(pending).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["identifier"], "CustomSpider/1.0");

    let learn = app.oneshot(admin("POST", "/api/v1/admin/learn", None)).await.unwrap();
    assert_eq!(learn.status(), StatusCode::OK);
    assert_eq!(json_body(learn).await["learned"], 0);
}

#[tokio::test]
async fn test_admin_deactivate_signature() {
    let app = app();
    let missing = app
        .clone()
        .oneshot(admin("PUT", "/api/v1/admin/signatures/9999/active", Some(json!({"active": false}))))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let updated = app
        .oneshot(admin("PUT", "/api/v1/admin/signatures/1/active", Some(json!({"active": false}))))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(json_body(updated).await["is_active"], false);
}

#[tokio::test]
async fn test_admin_custom_range() {
    let app = app();
    let bad = app
        .clone()
        .oneshot(admin("POST", "/api/v1/admin/ranges", Some(json!({"identity": "LabBot", "cidr": "10.0.0.0/99"}))))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let added = app
        .clone()
        .oneshot(admin("POST", "/api/v1/admin/ranges", Some(json!({"identity": "LabBot", "cidr": "10.42.0.0/16"}))))
        .await
        .unwrap();
    assert_eq!(json_body(added).await["added"], true);

    let verified = app
        .oneshot(post_json("/api/v1/verify", json!({"identity": "LabBot", "origin_address": "10.42.1.1"})))
        .await
        .unwrap();
    assert_eq!(json_body(verified).await["method"], "ip_range");
}

#[tokio::test]
async fn test_admin_range_is_written_to_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config { settings_path: Some(dir.path().join("settings.json")), ..test_config() };
    let app = app_with_config(GuardSettings::default(), config.clone());

    let added = app
        .clone()
        .oneshot(admin("POST", "/api/v1/admin/ranges", Some(json!({"identity": "LabBot", "cidr": "10.42.0.0/16"}))))
        .await
        .unwrap();
    assert_eq!(json_body(added).await["added"], true);

    // A restarted service loading the same file still knows the range
    let reloaded = config.load_settings().unwrap();
    assert_eq!(reloaded.ranges_for("labbot"), vec!["10.42.0.0/16"]);
    let restarted = app_with_config(reloaded, config);
    let verified = restarted
        .oneshot(post_json("/api/v1/verify", json!({"identity": "LabBot", "origin_address": "10.42.1.1"})))
        .await
        .unwrap();
    assert_eq!(json_body(verified).await["method"], "ip_range");
}
