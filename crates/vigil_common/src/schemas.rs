//! JSON schemas for the Vigil gateway API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Analysis request
// ============================================================================

/// Request priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A content-analysis request as submitted by a caller.
///
/// Immutable once created; owned by the request lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Content under analysis (required, non-empty)
    pub content: String,
    /// Optional hint at the suspected threat type
    #[serde(default)]
    pub threat_type_hint: Option<String>,
    /// Free-form caller context (page url, field name, ...)
    #[serde(default)]
    pub context: HashMap<String, String>,
    /// Enable the generative-AI inference branch
    #[serde(default = "default_true")]
    pub use_inference: bool,
    /// Enable the web-search verification branch
    #[serde(default = "default_true")]
    pub use_search: bool,
    #[serde(default)]
    pub priority: Priority,
}

fn default_true() -> bool {
    true
}

impl AnalysisRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            threat_type_hint: None,
            context: HashMap::new(),
            use_inference: true,
            use_search: true,
            priority: Priority::Normal,
        }
    }
}

// ============================================================================
// Source results and verdicts
// ============================================================================

/// One contributing analysis branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Inference,
    Search,
    Heuristic,
}

impl SourceKind {
    /// Tie-break priority when two sources report the same score.
    /// Lower wins: Inference > Search > Heuristic.
    pub fn priority(&self) -> u8 {
        match self {
            SourceKind::Inference => 0,
            SourceKind::Search => 1,
            SourceKind::Heuristic => 2,
        }
    }

    /// Fixed confidence weight applied during verdict merging.
    pub fn confidence_weight(&self) -> f64 {
        match self {
            SourceKind::Inference => 0.5,
            SourceKind::Search => 0.3,
            SourceKind::Heuristic => 0.2,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Inference => write!(f, "inference"),
            SourceKind::Search => write!(f, "search"),
            SourceKind::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Result of a single source's analysis attempt.
///
/// Produced per branch, consumed immediately by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: SourceKind,
    /// Threat score in [0, 1]
    pub threat_score: f64,
    pub threat_type: String,
    /// Source self-reported confidence in [0, 1]
    pub confidence: f64,
    /// Evidence fragments (matched keywords, urls, model rationale)
    #[serde(default)]
    pub indicators: Vec<String>,
    /// Set when the branch failed; an errored result never contributes a score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceResult {
    /// A failed branch, attributed but score-less.
    pub fn errored(source: SourceKind, error: impl Into<String>) -> Self {
        Self {
            source,
            threat_score: 0.0,
            threat_type: String::new(),
            confidence: 0.0,
            indicators: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Severity tier derived from the merged threat score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Fixed thresholds: >=0.8 CRITICAL, >=0.6 HIGH, >=0.4 MEDIUM, else LOW.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Severity::Critical
        } else if score >= 0.6 {
            Severity::High
        } else if score >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// The merged verdict returned to the caller.
///
/// Created once per unique fingerprint per TTL window; shared read-only by
/// every concurrent requester of that fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub threat_score: f64,
    pub threat_type: String,
    pub severity: Severity,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    /// Per-source evidence, including failed branches
    pub sources: Vec<SourceResult>,
    pub from_cache: bool,
    pub computed_at_ms: i64,
}

// ============================================================================
// Breaker observability
// ============================================================================

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Rolling per-breaker statistics (reset on a fixed snapshot interval)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Exponential moving average of call latency, milliseconds
    pub ema_latency_ms: f64,
}

/// Deep-copied snapshot of one breaker's record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerRecord {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub stats: RollingStats,
}

/// Aggregate health across all registered breakers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerHealthResponse {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub breakers: Vec<BreakerRecord>,
}

// ============================================================================
// Admin / health responses
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Response to a privileged cache clear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub evicted: usize,
}

// ============================================================================
// Pattern / report store types
// ============================================================================

/// A keyword indicator pattern used by the local heuristic analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatPattern {
    pub threat_type: String,
    pub keyword: String,
    /// Score contribution in [0, 1] when the keyword matches
    pub weight: f64,
}

/// A completed analysis report persisted through the report store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub fingerprint: String,
    pub threat_score: f64,
    pub threat_type: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(Severity::from_score(0.0), Severity::Low);
        assert_eq!(Severity::from_score(0.39), Severity::Low);
        assert_eq!(Severity::from_score(0.4), Severity::Medium);
        assert_eq!(Severity::from_score(0.6), Severity::High);
        assert_eq!(Severity::from_score(0.79), Severity::High);
        assert_eq!(Severity::from_score(0.8), Severity::Critical);
        assert_eq!(Severity::from_score(1.0), Severity::Critical);
    }

    #[test]
    fn test_source_priority_order() {
        assert!(SourceKind::Inference.priority() < SourceKind::Search.priority());
        assert!(SourceKind::Search.priority() < SourceKind::Heuristic.priority());
    }

    #[test]
    fn test_request_defaults_enable_both_upstreams() {
        let req: AnalysisRequest = serde_json::from_str(r#"{"content":"hello"}"#).unwrap();
        assert!(req.use_inference);
        assert!(req.use_search);
        assert_eq!(req.priority, Priority::Normal);
    }

    #[test]
    fn test_errored_source_result() {
        let r = SourceResult::errored(SourceKind::Search, "timed out");
        assert!(!r.is_ok());
        assert_eq!(r.threat_score, 0.0);
    }
}
