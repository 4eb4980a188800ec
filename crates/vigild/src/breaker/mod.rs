//! Circuit breaker for upstream dependency protection.
//!
//! One breaker per named dependency. Closed until consecutive failures cross
//! the threshold, Open while the dependency cools down, HalfOpen while
//! probing recovery. Only bookkeeping is serialized under the internal lock;
//! the guarded network call itself never runs while holding it.

pub mod registry;

use crate::config::BreakerConfig;
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vigil_common::{BreakerRecord, BreakerState, RollingStats};

/// Consecutive half-open successes required to close the breaker
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

/// Smoothing factor for the latency EMA
const EMA_ALPHA: f64 = 0.2;

/// Structured notifications of breaker lifecycle events.
///
/// Passed in at construction; replaces stringly-typed event dispatch.
pub trait BreakerObserver: Send + Sync {
    fn on_state_change(&self, name: &str, old: BreakerState, new: BreakerState);
    fn on_fallback(&self, name: &str);
}

/// Default observer: structured log records via tracing.
pub struct TracingObserver;

impl BreakerObserver for TracingObserver {
    fn on_state_change(&self, name: &str, old: BreakerState, new: BreakerState) {
        info!(breaker = name, %old, %new, "circuit breaker state change");
    }

    fn on_fallback(&self, name: &str) {
        warn!(breaker = name, "circuit breaker fallback invoked");
    }
}

/// Mutable breaker bookkeeping, guarded by the breaker's lock
struct BreakerCore {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure_at: Option<DateTime<Utc>>,
    next_retry: Option<Instant>,
    next_retry_at: Option<DateTime<Utc>>,
    stats: RollingStats,
}

/// Per-dependency failure-isolation state machine
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    expected_errors: Vec<String>,
    core: Mutex<BreakerCore>,
    observer: Arc<dyn BreakerObserver>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::with_observer(name, config, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        name: impl Into<String>,
        config: &BreakerConfig,
        observer: Arc<dyn BreakerObserver>,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout(),
            expected_errors: config
                .expected_errors
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
            core: Mutex::new(BreakerCore {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure_at: None,
                next_retry: None,
                next_retry_at: None,
                stats: RollingStats::default(),
            }),
            observer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute the operation under breaker protection. Fails fast with
    /// `BreakerOpen` when the breaker is open and the retry window has not
    /// elapsed.
    pub async fn execute<T, F, Fut>(&self, op: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.admit()?;

        let started = Instant::now();
        let result = op().await;
        self.account(&result, started.elapsed());
        result
    }

    /// Execute with a fallback. The fallback runs whenever the primary path
    /// is unavailable (breaker open) or fails; a failure of the fallback
    /// itself propagates without further breaker accounting.
    pub async fn execute_with_fallback<T, F, Fut, G, FutG>(
        &self,
        op: F,
        fallback: G,
    ) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
        G: FnOnce() -> FutG,
        FutG: Future<Output = GatewayResult<T>>,
    {
        match self.execute(op).await {
            Ok(value) => Ok(value),
            Err(primary_err) => {
                debug!(
                    breaker = self.name.as_str(),
                    error = %primary_err,
                    "primary path failed, invoking fallback"
                );
                self.observer.on_fallback(&self.name);
                fallback().await
            }
        }
    }

    /// Deep copy of the breaker record for observability. Never a live
    /// reference; callers cannot mutate breaker state through it.
    pub fn record(&self) -> BreakerRecord {
        let core = self.core.lock().expect("breaker lock poisoned");
        BreakerRecord {
            name: self.name.clone(),
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            half_open_successes: core.half_open_successes,
            last_failure_at: core.last_failure_at,
            next_retry_at: core.next_retry_at,
            stats: core.stats.clone(),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.core.lock().expect("breaker lock poisoned").state
    }

    /// Snapshot the rolling stats and reset the window.
    pub fn snapshot_and_reset_stats(&self) -> RollingStats {
        let mut core = self.core.lock().expect("breaker lock poisoned");
        std::mem::take(&mut core.stats)
    }

    /// Admission check. An Open breaker whose retry window elapsed moves to
    /// HalfOpen and admits this call as a trial.
    fn admit(&self) -> GatewayResult<()> {
        let mut core = self.core.lock().expect("breaker lock poisoned");

        if core.state == BreakerState::Open {
            let due = core
                .next_retry
                .map(|at| Instant::now() >= at)
                .unwrap_or(true);
            if due {
                self.transition(&mut core, BreakerState::HalfOpen);
                core.half_open_successes = 0;
            } else {
                return Err(GatewayError::BreakerOpen(self.name.clone()));
            }
        }

        Ok(())
    }

    /// Post-execution accounting: rolling stats plus the state machine.
    fn account<T>(&self, result: &GatewayResult<T>, latency: Duration) {
        let mut core = self.core.lock().expect("breaker lock poisoned");

        core.stats.requests += 1;
        let latency_ms = latency.as_secs_f64() * 1000.0;
        if core.stats.requests == 1 {
            core.stats.ema_latency_ms = latency_ms;
        } else {
            core.stats.ema_latency_ms =
                EMA_ALPHA * latency_ms + (1.0 - EMA_ALPHA) * core.stats.ema_latency_ms;
        }

        match result {
            Ok(_) => {
                core.stats.successes += 1;
                self.on_success(&mut core);
            }
            Err(err) => {
                core.stats.failures += 1;
                if self.is_expected_error(err) {
                    // Recorded for observability, but transient caller-side
                    // throttling is not evidence of dependency ill health.
                    debug!(
                        breaker = self.name.as_str(),
                        error = %err,
                        "expected error, breaker state unchanged"
                    );
                } else {
                    self.on_failure(&mut core);
                }
            }
        }
    }

    fn on_success(&self, core: &mut BreakerCore) {
        match core.state {
            BreakerState::Closed => {
                // Gradual forgiveness rather than an all-or-nothing reset
                core.consecutive_failures = core.consecutive_failures.saturating_sub(1);
            }
            BreakerState::HalfOpen => {
                core.half_open_successes += 1;
                if core.half_open_successes >= HALF_OPEN_SUCCESS_THRESHOLD {
                    self.transition(core, BreakerState::Closed);
                    core.consecutive_failures = 0;
                    core.half_open_successes = 0;
                    core.next_retry = None;
                    core.next_retry_at = None;
                }
            }
            BreakerState::Open => {
                // Calls are rejected while open; nothing to account
            }
        }
    }

    fn on_failure(&self, core: &mut BreakerCore) {
        core.last_failure_at = Some(Utc::now());

        match core.state {
            BreakerState::Closed => {
                core.consecutive_failures += 1;
                if core.consecutive_failures >= self.failure_threshold {
                    self.open(core);
                }
            }
            BreakerState::HalfOpen => {
                // A single failed trial reopens immediately
                self.open(core);
            }
            BreakerState::Open => {}
        }
    }

    fn open(&self, core: &mut BreakerCore) {
        self.transition(core, BreakerState::Open);
        core.half_open_successes = 0;
        core.next_retry = Some(Instant::now() + self.reset_timeout);
        core.next_retry_at =
            Some(Utc::now() + chrono::Duration::from_std(self.reset_timeout).unwrap_or_default());
    }

    fn transition(&self, core: &mut BreakerCore, new: BreakerState) {
        let old = core.state;
        if old != new {
            core.state = new;
            self.observer.on_state_change(&self.name, old, new);
        }
    }

    fn is_expected_error(&self, err: &GatewayError) -> bool {
        let message = err.to_string().to_lowercase();
        self.expected_errors.iter().any(|m| message.contains(m))
    }
}
