//! HTTP server for vigild

use crate::aggregator::Gateway;
use crate::routes;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            start_time: Instant::now(),
        }
    }
}

/// Build the full router (also used by the HTTP-level tests).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::analyze_routes())
        .merge(routes::admin_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until the shutdown future resolves.
pub async fn run(state: AppState, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
    let bind_addr = state.gateway.config().server.bind_addr.clone();
    let state = Arc::new(state);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
