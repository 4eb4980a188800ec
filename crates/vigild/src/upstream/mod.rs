//! Upstream analysis clients.
//!
//! Each client performs exactly one bounded HTTP round trip and returns a
//! typed `SourceResult` or a typed error. No retries happen here: recovery
//! is the circuit breaker's and aggregator's responsibility. The traits are
//! the test seam; production wires the reqwest-backed clients, tests wire
//! fakes.

pub mod inference;
pub mod search;

pub use inference::InferenceClient;
pub use search::SearchClient;

use crate::error::GatewayResult;
use async_trait::async_trait;
use vigil_common::SourceResult;

/// Generative-AI inference upstream
#[async_trait]
pub trait InferenceApi: Send + Sync {
    async fn analyze(&self, content: &str, threat_type_hint: Option<&str>)
        -> GatewayResult<SourceResult>;
}

/// Web-search verification upstream
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn verify(&self, content: &str) -> GatewayResult<SourceResult>;
}
