//! API routes for vigild

use crate::error::{GatewayError, GatewayResult};
use crate::server::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::info;
use vigil_common::{
    AnalysisRequest, BreakerHealthResponse, CacheClearResponse, HealthResponse, Verdict,
};

type AppStateArc = Arc<AppState>;

// ============================================================================
// Analysis
// ============================================================================

pub fn analyze_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/analyze", post(analyze))
}

async fn analyze(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    Json(request): Json<AnalysisRequest>,
) -> GatewayResult<Json<Verdict>> {
    let client_key = extract_client_key(&headers);
    let verdict = state.gateway.analyze(request, &client_key).await?;
    Ok(Json(verdict))
}

// ============================================================================
// Privileged admin surface
// ============================================================================

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/cache", delete(clear_cache))
        .route("/v1/system/circuit-breakers", get(breaker_health))
}

async fn clear_cache(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
) -> GatewayResult<Json<CacheClearResponse>> {
    require_operator(&state, &headers)?;

    let evicted = state.gateway.clear_cache().await;
    info!(evicted, "cache cleared by operator");
    Ok(Json(CacheClearResponse { evicted }))
}

async fn breaker_health(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
) -> GatewayResult<Json<BreakerHealthResponse>> {
    require_operator(&state, &headers)?;
    Ok(Json(state.gateway.registry().health_snapshot()))
}

/// Privileged endpoints require the configured operator token. An empty
/// configured token disables the privileged surface outright.
fn require_operator(state: &AppState, headers: &HeaderMap) -> GatewayResult<()> {
    let configured = &state.gateway.config().server.operator_token;
    if configured.is_empty() {
        return Err(GatewayError::Unauthorized);
    }

    match extract_auth_token(headers) {
        Some(token) if token == *configured => Ok(()),
        _ => Err(GatewayError::Unauthorized),
    }
}

// ============================================================================
// Health
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Client identity extraction
// ============================================================================

/// Rate limiting identifies callers by bearer token when present, falling
/// back to the forwarded peer address.
fn extract_client_key(headers: &HeaderMap) -> String {
    if let Some(token) = extract_auth_token(headers) {
        return format!("token:{}", token);
    }

    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return format!("addr:{}", first_ip.trim());
            }
        }
    }

    "addr:unknown".to_string()
}

/// Parse "Authorization: Bearer <token>"; a bare token is also accepted.
fn extract_auth_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("authorization")?;
    let auth_str = auth_header.to_str().ok()?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        Some(token.trim().to_string())
    } else {
        Some(auth_str.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_client_key_prefers_bearer_token() {
        let mut headers = headers_with("authorization", "Bearer abc123");
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));

        assert_eq!(extract_client_key(&headers), "token:abc123");
    }

    #[test]
    fn test_client_key_falls_back_to_forwarded_addr() {
        let headers = headers_with("x-forwarded-for", "10.0.0.1, 192.168.0.1");
        assert_eq!(extract_client_key(&headers), "addr:10.0.0.1");
    }

    #[test]
    fn test_client_key_unknown_without_identity() {
        assert_eq!(extract_client_key(&HeaderMap::new()), "addr:unknown");
    }

    #[test]
    fn test_auth_token_bare_format_accepted() {
        let headers = headers_with("authorization", "raw-token");
        assert_eq!(extract_auth_token(&headers), Some("raw-token".to_string()));
    }
}
