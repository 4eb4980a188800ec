//! Background housekeeping tasks.
//!
//! Each recurring job is an explicitly owned task with a cancellation
//! handle, stopped on gateway shutdown. Nothing here is fire-and-forget.

use crate::aggregator::Gateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Spawn the stats snapshot, pattern refresh, and rate bucket cleanup
    /// loops for the given gateway.
    pub fn spawn(gateway: Arc<Gateway>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        let stats_interval =
            Duration::from_secs(gateway.config().breaker.stats_snapshot_secs.max(1));
        handles.push(tokio::spawn(stats_snapshot_loop(
            Arc::clone(&gateway),
            stats_interval,
            shutdown_rx.clone(),
        )));

        let refresh_interval =
            Duration::from_secs(gateway.config().heuristic.pattern_refresh_secs.max(1));
        handles.push(tokio::spawn(pattern_refresh_loop(
            Arc::clone(&gateway),
            refresh_interval,
            shutdown_rx.clone(),
        )));

        let cleanup_interval =
            Duration::from_secs(gateway.config().rate_limit.window_secs.max(1));
        handles.push(tokio::spawn(rate_cleanup_loop(
            gateway,
            cleanup_interval,
            shutdown_rx,
        )));

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Signal every loop to stop and wait for them to finish.
    pub async fn shutdown(self) {
        info!("stopping background tasks");
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn stats_snapshot_loop(
    gateway: Arc<Gateway>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for breaker in gateway.registry().all() {
                    let stats = breaker.snapshot_and_reset_stats();
                    info!(
                        breaker = breaker.name(),
                        requests = stats.requests,
                        successes = stats.successes,
                        failures = stats.failures,
                        ema_latency_ms = stats.ema_latency_ms,
                        "breaker stats window"
                    );
                }
            }
            _ = shutdown.changed() => {
                debug!("stats snapshot loop stopped");
                return;
            }
        }
    }
}

async fn pattern_refresh_loop(
    gateway: Arc<Gateway>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match gateway.refresh_patterns().await {
                    Ok(count) => debug!(count, "pattern refresh complete"),
                    Err(e) => warn!("pattern refresh failed: {}", e),
                }
            }
            _ = shutdown.changed() => {
                debug!("pattern refresh loop stopped");
                return;
            }
        }
    }
}

async fn rate_cleanup_loop(
    gateway: Arc<Gateway>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                gateway.cleanup_rate_buckets().await;
            }
            _ = shutdown.changed() => {
                debug!("rate cleanup loop stopped");
                return;
            }
        }
    }
}
