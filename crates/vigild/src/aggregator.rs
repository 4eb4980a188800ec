//! The gateway orchestration core.
//!
//! One explicitly constructed `Gateway` owns the registry, cache, rate
//! limiter, heuristic analyzer and upstream clients; request handlers borrow
//! it. No module-level singletons, so the whole pipeline is constructible in
//! tests with fake clients.

use crate::breaker::{registry::BreakerRegistry, CircuitBreaker};
use crate::cache::RequestCache;
use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::heuristic::HeuristicAnalyzer;
use crate::patterns::{default_patterns, PatternStore};
use crate::ratelimit::RateLimiter;
use crate::upstream::{InferenceApi, SearchApi};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};
use vigil_common::{
    fingerprint, AnalysisReport, AnalysisRequest, Severity, SourceKind, SourceResult, Verdict,
};

/// Largest accepted content payload
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

pub const INFERENCE_BREAKER: &str = "inference";
pub const SEARCH_BREAKER: &str = "search";

pub struct Gateway {
    config: Config,
    registry: Arc<BreakerRegistry>,
    cache: RequestCache,
    rate_limiter: RateLimiter,
    heuristic: HeuristicAnalyzer,
    inference: Arc<dyn InferenceApi>,
    search: Arc<dyn SearchApi>,
    inference_breaker: Arc<CircuitBreaker>,
    search_breaker: Arc<CircuitBreaker>,
    pattern_store: Arc<dyn PatternStore>,
}

impl Gateway {
    pub fn new(
        config: Config,
        inference: Arc<dyn InferenceApi>,
        search: Arc<dyn SearchApi>,
        pattern_store: Arc<dyn PatternStore>,
    ) -> Self {
        let registry = Arc::new(BreakerRegistry::new());
        let inference_breaker = registry.register(INFERENCE_BREAKER, &config.breaker);
        let search_breaker = registry.register(SEARCH_BREAKER, &config.breaker);

        Self {
            cache: RequestCache::new(config.cache.max_entries),
            rate_limiter: RateLimiter::new(
                Duration::from_secs(config.rate_limit.window_secs),
                config.rate_limit.max_requests,
            ),
            heuristic: HeuristicAnalyzer::new(default_patterns()),
            registry,
            inference,
            search,
            inference_breaker,
            search_breaker,
            pattern_store,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &BreakerRegistry {
        &self.registry
    }

    /// Full request path: validation, rate limiting, cache lookup with
    /// single-flight, fan-out, merge.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        client_key: &str,
    ) -> GatewayResult<Verdict> {
        validate(&request)?;
        self.rate_limiter.consume(client_key).await?;

        let fp = fingerprint(&request);
        let ttl = Duration::from_secs(self.config.cache.ttl_secs);

        self.cache
            .get_or_compute(&fp, ttl, || self.compute(&request, &fp))
            .await
    }

    /// Fan out to the enabled upstream branches and merge. Runs at most once
    /// per fingerprint per TTL window (single-flight inside the cache).
    async fn compute(&self, request: &AnalysisRequest, fp: &str) -> GatewayResult<Verdict> {
        let hint = request.threat_type_hint.as_deref();

        // Heuristic baseline: cheap, synchronous, never the sole truth
        // unless both upstreams fail or are disabled.
        let baseline = self.heuristic.analyze(&request.content, hint);

        let branch_timeout = Duration::from_secs(self.config.upstream.branch_timeout_secs);

        let inference_branch = async {
            if !request.use_inference {
                return None;
            }
            Some(
                run_branch(
                    SourceKind::Inference,
                    branch_timeout,
                    self.inference_breaker
                        .execute(|| self.inference.analyze(&request.content, hint)),
                )
                .await,
            )
        };

        let search_branch = async {
            if !request.use_search {
                return None;
            }
            Some(
                run_branch(
                    SourceKind::Search,
                    branch_timeout,
                    self.search_breaker
                        .execute(|| self.search.verify(&request.content)),
                )
                .await,
            )
        };

        // Branches run concurrently; latency is bounded by the slowest
        // single branch, not the sum.
        let (inference_result, search_result) = tokio::join!(inference_branch, search_branch);

        let mut sources = Vec::with_capacity(3);
        if let Some(result) = inference_result {
            sources.push(result);
        }
        if let Some(result) = search_result {
            sources.push(result);
        }
        sources.push(baseline);

        let verdict = merge_sources(sources)?;
        self.record_report(fp, &verdict);
        Ok(verdict)
    }

    /// Persist a report for actionable verdicts. Failures are logged, never
    /// fatal to the request.
    fn record_report(&self, fp: &str, verdict: &Verdict) {
        if verdict.severity < Severity::High {
            return;
        }

        let store = Arc::clone(&self.pattern_store);
        let report = AnalysisReport {
            fingerprint: fp.to_string(),
            threat_score: verdict.threat_score,
            threat_type: verdict.threat_type.clone(),
            severity: verdict.severity,
            created_at: chrono::Utc::now(),
        };

        tokio::spawn(async move {
            if let Err(e) = store.write_report(report).await {
                warn!("failed to write analysis report: {}", e);
            }
        });
    }

    /// Refresh heuristic indicators from the pattern store.
    pub async fn refresh_patterns(&self) -> GatewayResult<usize> {
        let patterns = self.pattern_store.read_patterns(None).await?;
        let count = patterns.len();
        if count > 0 {
            self.heuristic.replace_patterns(patterns);
            debug!(count, "heuristic patterns refreshed");
        }
        Ok(count)
    }

    /// Privileged: evict every cached verdict.
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    /// Periodic housekeeping used by the background tasks.
    pub async fn cleanup_rate_buckets(&self) {
        self.rate_limiter.cleanup().await;
    }
}

fn validate(request: &AnalysisRequest) -> GatewayResult<()> {
    if request.content.is_empty() {
        return Err(GatewayError::Validation("content must not be empty".into()));
    }
    if request.content.len() > MAX_CONTENT_BYTES {
        return Err(GatewayError::Validation(format!(
            "content exceeds {} bytes",
            MAX_CONTENT_BYTES
        )));
    }
    Ok(())
}

/// Run one upstream branch under its deadline, absorbing failures into an
/// attributed errored result. The branch deadline is independent of the
/// breaker's own bookkeeping so overall request latency stays bounded.
async fn run_branch(
    kind: SourceKind,
    deadline: Duration,
    fut: impl std::future::Future<Output = GatewayResult<SourceResult>>,
) -> SourceResult {
    match timeout(deadline, fut).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            debug!(source = %kind, error = %err, "branch failed, absorbed");
            SourceResult::errored(kind, err.to_string())
        }
        Err(_) => {
            warn!(source = %kind, "branch deadline elapsed");
            SourceResult::errored(kind, format!("branch timed out after {:?}", deadline))
        }
    }
}

/// Merge completed source results into one verdict.
///
/// Worst case wins: the threat score is the maximum across non-errored
/// sources, so a single strong danger signal is never diluted by weaker or
/// absent ones. Severity always derives from the merged numeric score.
pub fn merge_sources(sources: Vec<SourceResult>) -> GatewayResult<Verdict> {
    let usable: Vec<&SourceResult> = sources.iter().filter(|s| s.is_ok()).collect();

    if usable.is_empty() {
        let detail = sources
            .iter()
            .map(|s| {
                format!(
                    "{}: {}",
                    s.source,
                    s.error.as_deref().unwrap_or("no result")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(GatewayError::AggregationExhausted(detail));
    }

    let top = usable
        .iter()
        .max_by(|a, b| {
            a.threat_score
                .partial_cmp(&b.threat_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                // Tie: higher-priority source wins (Inference > Search > Heuristic)
                .then_with(|| b.source.priority().cmp(&a.source.priority()))
        })
        .expect("usable is non-empty");

    let threat_score = top.threat_score.min(1.0);

    let confidence = usable
        .iter()
        .map(|s| s.source.confidence_weight() * s.confidence)
        .sum::<f64>()
        .min(1.0);

    let severity = Severity::from_score(threat_score);

    Ok(Verdict {
        threat_score,
        threat_type: top.threat_type.clone(),
        severity,
        confidence,
        recommendations: recommendations_for(severity),
        sources,
        from_cache: false,
        computed_at_ms: chrono::Utc::now().timestamp_millis(),
    })
}

/// Fixed recommendation table keyed by severity.
pub fn recommendations_for(severity: Severity) -> Vec<String> {
    let entries: &[&str] = match severity {
        Severity::Critical => &[
            "Block the content immediately",
            "Isolate the affected session",
            "Escalate to the security team",
        ],
        Severity::High => &[
            "Quarantine the content for review",
            "Notify the security team",
        ],
        Severity::Medium => &[
            "Flag for manual review",
            "Monitor the source for repeat activity",
        ],
        Severity::Low => &["No action required", "Log for audit trail"],
    };
    entries.iter().map(|s| s.to_string()).collect()
}
