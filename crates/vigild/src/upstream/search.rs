//! Search verification upstream client.
//!
//! One GET per call against the search endpoint: the content (truncated to a
//! query-sized excerpt) goes out as the query, ranked results with
//! title/snippet/url come back. The score reflects how strongly the result
//! set corroborates a known-threat reading of the content.

use super::SearchApi;
use crate::config::UpstreamConfig;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use vigil_common::{SourceKind, SourceResult};

/// Longest content excerpt sent as a search query
const MAX_QUERY_CHARS: usize = 200;

/// Markers in result titles/snippets that corroborate a threat reading
const THREAT_MARKERS: &[(&str, &str)] = &[
    ("phishing", "phishing"),
    ("scam", "scam"),
    ("fraud", "scam"),
    ("malware", "malware"),
    ("ransomware", "malware"),
    ("prompt injection", "prompt_injection"),
    ("jailbreak", "prompt_injection"),
    ("malicious", "malware"),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    url: String,
}

pub struct SearchClient {
    client: reqwest::Client,
    url: String,
}

impl SearchClient {
    pub fn new(config: &UpstreamConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client build failed: {}", e)))?;

        Ok(Self {
            client,
            url: config.search_url.clone(),
        })
    }
}

#[async_trait]
impl SearchApi for SearchClient {
    async fn verify(&self, content: &str) -> GatewayResult<SourceResult> {
        let query: String = content.chars().take(MAX_QUERY_CHARS).collect();

        let response = self
            .client
            .get(&self.url)
            .query(&[("q", query.as_str())])
            .send()
            .await
            .map_err(|e| GatewayError::Upstream {
                status: 0,
                body: format!("search request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse =
            response.json().await.map_err(|e| GatewayError::Upstream {
                status: status.as_u16(),
                body: format!("search response not json: {}", e),
            })?;

        Ok(score_results(&parsed.results))
    }
}

/// Score the ranked result set: the fraction of results corroborating a
/// threat reading drives the score, the dominant marker drives the type.
fn score_results(hits: &[SearchHit]) -> SourceResult {
    if hits.is_empty() {
        return SourceResult {
            source: SourceKind::Search,
            threat_score: 0.0,
            threat_type: "benign".to_string(),
            confidence: 0.3,
            indicators: Vec::new(),
            error: None,
        };
    }

    let mut corroborating = 0usize;
    let mut type_votes: Vec<(String, usize)> = Vec::new();
    let mut indicators = Vec::new();

    for hit in hits {
        let text = format!("{} {}", hit.title, hit.snippet).to_lowercase();
        let mut hit_matched = false;

        for (marker, threat_type) in THREAT_MARKERS {
            if text.contains(marker) {
                hit_matched = true;
                match type_votes.iter_mut().find(|(t, _)| t == threat_type) {
                    Some((_, votes)) => *votes += 1,
                    None => type_votes.push((threat_type.to_string(), 1)),
                }
            }
        }

        if hit_matched {
            corroborating += 1;
            if !hit.url.is_empty() {
                indicators.push(hit.url.clone());
            }
        }
    }

    let threat_score = corroborating as f64 / hits.len() as f64;
    let threat_type = type_votes
        .into_iter()
        .max_by_key(|(_, votes)| *votes)
        .map(|(t, _)| t)
        .unwrap_or_else(|| "benign".to_string());

    SourceResult {
        source: SourceKind::Search,
        threat_score,
        threat_type,
        // More results means more signal to stand on
        confidence: (0.4 + 0.05 * hits.len() as f64).min(0.8),
        indicators,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hit(title: &str, snippet: &str, url: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            snippet: snippet.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_empty_results_are_benign() {
        let result = score_results(&[]);
        assert_eq!(result.threat_score, 0.0);
        assert_eq!(result.threat_type, "benign");
    }

    #[test]
    fn test_all_results_corroborate() {
        let hits = vec![
            hit("Known phishing campaign", "reported phishing", "https://a.example"),
            hit("Phishing alert", "credential phishing", "https://b.example"),
        ];
        let result = score_results(&hits);
        assert_relative_eq!(result.threat_score, 1.0);
        assert_eq!(result.threat_type, "phishing");
        assert_eq!(result.indicators.len(), 2);
    }

    #[test]
    fn test_partial_corroboration() {
        let hits = vec![
            hit("Known scam text", "advance fee fraud", "https://a.example"),
            hit("Recipe blog", "how to bake bread", "https://b.example"),
            hit("Cooking tips", "sourdough starters", "https://c.example"),
            hit("Scam tracker", "reported scam", "https://d.example"),
        ];
        let result = score_results(&hits);
        assert_relative_eq!(result.threat_score, 0.5);
        assert_eq!(result.threat_type, "scam");
    }

    #[test]
    fn test_dominant_marker_wins_type() {
        let hits = vec![
            hit("malware dropper", "known malware", "https://a.example"),
            hit("malware family", "ransomware strain", "https://b.example"),
            hit("scam report", "gift card scam", "https://c.example"),
        ];
        let result = score_results(&hits);
        assert_eq!(result.threat_type, "malware");
    }

    #[test]
    fn test_clean_results_score_zero() {
        let hits = vec![
            hit("Weather today", "sunny with clouds", "https://a.example"),
            hit("Sports news", "final score 2-1", "https://b.example"),
        ];
        let result = score_results(&hits);
        assert_eq!(result.threat_score, 0.0);
        assert_eq!(result.threat_type, "benign");
        assert!(result.indicators.is_empty());
    }
}
