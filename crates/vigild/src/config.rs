//! Configuration management for vigild.
//!
//! Loads settings from /etc/vigil/config.toml or uses defaults. Every field
//! carries a serde default so a partial file merges field-wise.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/vigil/config.toml";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the gateway listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Shared secret for privileged endpoints (cache clear, breaker snapshot).
    /// Empty disables the privileged surface entirely.
    #[serde(default)]
    pub operator_token: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:7890".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            operator_token: String::new(),
        }
    }
}

/// Upstream endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Inference API endpoint (prompt in, structured JSON or free text out)
    #[serde(default = "default_inference_url")]
    pub inference_url: String,

    /// Model name passed to the inference API
    #[serde(default = "default_inference_model")]
    pub inference_model: String,

    /// Search API endpoint (query in, ranked results out)
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Hard timeout for one upstream HTTP round trip
    #[serde(default = "default_upstream_timeout")]
    pub request_timeout_secs: u64,

    /// Per-branch deadline inside the aggregator. Must exceed the request
    /// timeout so the branch timeout only fires when a fallback itself hangs.
    #[serde(default = "default_branch_timeout")]
    pub branch_timeout_secs: u64,
}

fn default_inference_url() -> String {
    "http://127.0.0.1:11434/api/generate".to_string()
}

fn default_inference_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

fn default_search_url() -> String {
    "http://127.0.0.1:8200/search".to_string()
}

fn default_upstream_timeout() -> u64 {
    8
}

fn default_branch_timeout() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            inference_url: default_inference_url(),
            inference_model: default_inference_model(),
            search_url: default_search_url(),
            request_timeout_secs: default_upstream_timeout(),
            branch_timeout_secs: default_branch_timeout(),
        }
    }
}

/// Circuit breaker configuration, shared by all registered breakers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds to wait in Open before admitting a half-open trial
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,

    /// Substring matchers for errors that must not move the state machine
    /// (caller-side throttling is not evidence of dependency ill health)
    #[serde(default = "default_expected_errors")]
    pub expected_errors: Vec<String>,

    /// Interval between rolling-stats snapshots
    #[serde(default = "default_stats_snapshot")]
    pub stats_snapshot_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> u64 {
    30
}

fn default_expected_errors() -> Vec<String> {
    vec!["quota".to_string(), "rate limit".to_string(), "429".to_string()]
}

fn default_stats_snapshot() -> u64 {
    300
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout(),
            expected_errors: default_expected_errors(),
            stats_snapshot_secs: default_stats_snapshot(),
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

/// Request cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Verdict time-to-live in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// LRU capacity; eviction beyond this bound
    #[serde(default = "default_cache_capacity")]
    pub max_entries: usize,
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_capacity(),
        }
    }
}

/// Rate limiter configuration (fixed window per client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds
    #[serde(default = "default_rate_window")]
    pub window_secs: u64,

    /// Requests allowed per client per window
    #[serde(default = "default_rate_quota")]
    pub max_requests: u32,
}

fn default_rate_window() -> u64 {
    60
}

fn default_rate_quota() -> u32 {
    100
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_rate_window(),
            max_requests: default_rate_quota(),
        }
    }
}

/// Heuristic analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Interval between pattern refreshes from the pattern store
    #[serde(default = "default_pattern_refresh")]
    pub pattern_refresh_secs: u64,
}

fn default_pattern_refresh() -> u64 {
    600
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            pattern_refresh_secs: default_pattern_refresh(),
        }
    }
}

/// Top-level vigild configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub heuristic: HeuristicConfig,
}

impl Config {
    /// Load from the standard path, falling back to defaults when absent.
    pub fn load() -> Self {
        Self::load_from(CONFIG_PATH)
    }

    /// Load from an explicit path. A missing file yields defaults; a
    /// malformed file is logged and also yields defaults, keeping the
    /// daemon startable with a broken config on disk.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(Some(config)) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Ok(None) => {
                info!("No config at {}, using defaults", path.display());
                Config::default()
            }
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                Config::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Option<Config>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(Some(config))
    }
}
