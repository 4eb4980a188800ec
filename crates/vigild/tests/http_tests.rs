//! HTTP boundary tests: routing, serialization, auth, and status codes.
//!
//! Requests go through the real router via `tower::ServiceExt::oneshot`;
//! upstream clients are stubbed so nothing leaves the process.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use vigil_common::{SourceKind, SourceResult};
use vigild::aggregator::Gateway;
use vigild::config::Config;
use vigild::error::GatewayResult;
use vigild::patterns::MemoryPatternStore;
use vigild::server::{build_router, AppState};
use vigild::upstream::{InferenceApi, SearchApi};

struct StubInference;

#[async_trait]
impl InferenceApi for StubInference {
    async fn analyze(&self, _content: &str, _hint: Option<&str>) -> GatewayResult<SourceResult> {
        Ok(SourceResult {
            source: SourceKind::Inference,
            threat_score: 0.9,
            threat_type: "prompt_injection".to_string(),
            confidence: 0.85,
            indicators: vec![],
            error: None,
        })
    }
}

struct StubSearch;

#[async_trait]
impl SearchApi for StubSearch {
    async fn verify(&self, _content: &str) -> GatewayResult<SourceResult> {
        Ok(SourceResult {
            source: SourceKind::Search,
            threat_score: 0.3,
            threat_type: "phishing".to_string(),
            confidence: 0.5,
            indicators: vec![],
            error: None,
        })
    }
}

fn router_with(config: Config) -> axum::Router {
    let gateway = Arc::new(Gateway::new(
        config,
        Arc::new(StubInference),
        Arc::new(StubSearch),
        Arc::new(MemoryPatternStore::seeded()),
    ));
    build_router(Arc::new(AppState::new(gateway)))
}

fn operator_config(token: &str) -> Config {
    let mut config = Config::default();
    config.server.operator_token = token.to_string();
    config
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_analyze_endpoint_returns_verdict() {
    let app = router_with(Config::default());

    let response = app
        .oneshot(
            Request::post("/v1/analyze")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"content": "check this text"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let verdict = body_json(response).await;
    assert_eq!(verdict["threat_score"], 0.9);
    assert_eq!(verdict["severity"], "CRITICAL");
    assert_eq!(verdict["threat_type"], "prompt_injection");
    assert_eq!(verdict["sources"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_analyze_empty_content_is_bad_request() {
    let app = router_with(Config::default());

    let response = app
        .oneshot(
            Request::post("/v1/analyze")
                .header("content-type", "application/json")
                .body(Body::from(json!({"content": ""}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limited_request_is_429() {
    let mut config = Config::default();
    config.rate_limit.max_requests = 1;
    let app = router_with(config);

    let request = |content: &str| {
        Request::post("/v1/analyze")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::from(json!({ "content": content }).to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(request("first")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(request("second")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_health_endpoint_is_public() {
    let app = router_with(Config::default());

    let response = app
        .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_breaker_health_requires_operator_token() {
    let app = router_with(operator_config("secret-token"));

    let denied = app
        .clone()
        .oneshot(
            Request::get("/v1/system/circuit-breakers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .clone()
        .oneshot(
            Request::get("/v1/system/circuit-breakers")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let allowed = app
        .oneshot(
            Request::get("/v1/system/circuit-breakers")
                .header("authorization", "Bearer secret-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let snapshot = body_json(allowed).await;
    let names: Vec<&str> = snapshot["breakers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["inference", "search"]);
}

/// An empty configured token disables the privileged surface entirely, even
/// for callers presenting an empty credential.
#[tokio::test]
async fn test_admin_surface_disabled_without_configured_token() {
    let app = router_with(Config::default());

    let response = app
        .oneshot(Request::delete("/v1/cache").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cache_clear_reports_evictions() {
    let app = router_with(operator_config("secret-token"));

    // Populate one cache entry through the public path
    let warm = app
        .clone()
        .oneshot(
            Request::post("/v1/analyze")
                .header("content-type", "application/json")
                .body(Body::from(json!({"content": "cache me"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(warm.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::delete("/v1/cache")
                .header("authorization", "Bearer secret-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cleared = body_json(response).await;
    assert_eq!(cleared["evicted"], 1);
}
