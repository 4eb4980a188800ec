//! Gateway error taxonomy and HTTP status mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Every failure the gateway can surface to a caller or absorb internally.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed request; never retried
    #[error("invalid request: {0}")]
    Validation(String),

    /// Client quota exhausted for the current window
    #[error("rate limit exceeded for client '{client_key}'")]
    RateLimited { client_key: String },

    /// One dependency failed; absorbed by breaker/fallback, not surfaced directly
    #[error("upstream error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    /// Dependency known-unhealthy; short-circuited without a network attempt
    #[error("circuit breaker '{0}' is open")]
    BreakerOpen(String),

    /// Every enabled source failed; the only upstream-caused total failure
    #[error("all analysis sources failed: {0}")]
    AggregationExhausted(String),

    /// Missing or wrong operator credential on a privileged endpoint
    #[error("operator credential required")]
    Unauthorized,

    /// Programming defect; always surfaced, never swallowed
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GatewayError::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, self.to_string())
            }
            GatewayError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            GatewayError::AggregationExhausted(msg) => {
                tracing::warn!("no analysis sources available: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "no analysis sources available".to_string(),
                )
            }
            // Breaker and upstream errors are absorbed by the aggregator;
            // reaching the boundary with one is a defect.
            GatewayError::Upstream { .. }
            | GatewayError::BreakerOpen(_)
            | GatewayError::Internal(_) => {
                tracing::error!("internal gateway error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                GatewayError::Validation("empty content".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::RateLimited {
                    client_key: "c1".into(),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                GatewayError::AggregationExhausted("all branches failed".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (GatewayError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                GatewayError::Internal("bug".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = err.into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
