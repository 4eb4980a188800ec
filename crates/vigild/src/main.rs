//! Vigil Daemon - threat analysis gateway entry point

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigild::aggregator::Gateway;
use vigild::config::Config;
use vigild::patterns::MemoryPatternStore;
use vigild::server::{self, AppState};
use vigild::tasks::BackgroundTasks;
use vigild::upstream::{InferenceClient, SearchClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "vigild=info".into()),
        )
        .init();

    info!("Vigil Gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load();

    let inference = Arc::new(InferenceClient::new(&config.upstream)?);
    let search = Arc::new(SearchClient::new(&config.upstream)?);
    let pattern_store = Arc::new(MemoryPatternStore::seeded());

    let gateway = Arc::new(Gateway::new(config, inference, search, pattern_store));

    // Seed heuristic indicators from the store before serving traffic
    let seeded = gateway.refresh_patterns().await?;
    info!(patterns = seeded, "heuristic analyzer primed");

    let tasks = BackgroundTasks::spawn(Arc::clone(&gateway));

    let state = AppState::new(Arc::clone(&gateway));
    server::run(state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await?;

    tasks.shutdown().await;
    info!("Vigil Gateway stopped");
    Ok(())
}
