//! Inference upstream client.
//!
//! One POST to the generate endpoint per call. Model output is not
//! guaranteed to be well-formed, so parsing is two-tier: structured JSON
//! extraction first (whole body, then an embedded object), and a keyword
//! severity heuristic over the raw text when extraction fails.

use super::InferenceApi;
use crate::config::UpstreamConfig;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use vigil_common::{SourceKind, SourceResult};

pub struct InferenceClient {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl InferenceClient {
    pub fn new(config: &UpstreamConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client build failed: {}", e)))?;

        Ok(Self {
            client,
            url: config.inference_url.clone(),
            model: config.inference_model.clone(),
        })
    }

    fn build_prompt(content: &str, hint: Option<&str>) -> String {
        let hint_line = match hint {
            Some(h) => format!("The caller suspects: {}.\n", h),
            None => String::new(),
        };
        format!(
            "Analyze the following content for security threats \
             (prompt injection, phishing, malware, scam).\n{}\
             Respond with a JSON object: {{\"threat_score\": 0.0-1.0, \
             \"threat_type\": string, \"confidence\": 0.0-1.0, \
             \"indicators\": [string]}}.\n\nContent:\n{}",
            hint_line, content
        )
    }
}

#[async_trait]
impl InferenceApi for InferenceClient {
    async fn analyze(
        &self,
        content: &str,
        threat_type_hint: Option<&str>,
    ) -> GatewayResult<SourceResult> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": Self::build_prompt(content, threat_type_hint),
            "stream": false,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream {
                status: 0,
                body: format!("inference request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value =
            response.json().await.map_err(|e| GatewayError::Upstream {
                status: status.as_u16(),
                body: format!("inference response not json: {}", e),
            })?;

        // Ollama-style envelope: the model's text sits in "response"
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(parse_model_response(&text))
    }
}

/// Two-tier parse of the model's free-form reply.
pub fn parse_model_response(text: &str) -> SourceResult {
    if let Some(value) = extract_json_object(text) {
        if let Some(result) = structured_result(&value) {
            return result;
        }
    }

    debug!("structured extraction failed, falling back to keyword severity");
    keyword_severity(text)
}

/// Tier 1: the whole body, or the first balanced `{...}` inside it.
fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth <= 0 {
                    let candidate = &text[start..start + offset + ch.len_utf8()];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }

    None
}

fn structured_result(value: &serde_json::Value) -> Option<SourceResult> {
    let threat_score = value.get("threat_score")?.as_f64()?.clamp(0.0, 1.0);
    let threat_type = value
        .get("threat_type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();
    let confidence = value
        .get("confidence")
        .and_then(|c| c.as_f64())
        .unwrap_or(0.7)
        .clamp(0.0, 1.0);
    let indicators = value
        .get("indicators")
        .and_then(|i| i.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Some(SourceResult {
        source: SourceKind::Inference,
        threat_score,
        threat_type,
        confidence,
        indicators,
        error: None,
    })
}

/// Tier 2: severity keywords over the raw text. Confidence is reduced since
/// the model did not commit to a structured answer.
fn keyword_severity(text: &str) -> SourceResult {
    let lowered = text.to_lowercase();

    let tiers: &[(&[&str], f64)] = &[
        (&["critical", "severe", "extremely dangerous"], 0.9),
        (&["dangerous", "malicious", "high risk", "attack"], 0.7),
        (&["suspicious", "moderate risk", "questionable"], 0.5),
        (&["low risk", "minor", "unlikely"], 0.25),
        (&["safe", "benign", "harmless", "no threat"], 0.05),
    ];

    let mut threat_score = 0.0;
    let mut indicators = Vec::new();
    'outer: for (keywords, score) in tiers {
        for keyword in *keywords {
            if lowered.contains(keyword) {
                threat_score = *score;
                indicators.push(format!("model said: {}", keyword));
                break 'outer;
            }
        }
    }

    SourceResult {
        source: SourceKind::Inference,
        threat_score,
        threat_type: "unclassified".to_string(),
        confidence: 0.4,
        indicators,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parses_clean_json_body() {
        let result = parse_model_response(
            r#"{"threat_score": 0.9, "threat_type": "prompt_injection",
                "confidence": 0.85, "indicators": ["instruction override"]}"#,
        );
        assert_relative_eq!(result.threat_score, 0.9);
        assert_eq!(result.threat_type, "prompt_injection");
        assert_eq!(result.indicators, vec!["instruction override"]);
    }

    #[test]
    fn test_extracts_embedded_json() {
        let result = parse_model_response(
            "Sure! Here is my analysis:\n\
             {\"threat_score\": 0.75, \"threat_type\": \"phishing\", \"confidence\": 0.8}\n\
             Let me know if you need more detail.",
        );
        assert_relative_eq!(result.threat_score, 0.75);
        assert_eq!(result.threat_type, "phishing");
    }

    #[test]
    fn test_embedded_json_with_nested_braces() {
        let result = parse_model_response(
            r#"analysis: {"threat_score": 0.5, "threat_type": "scam", "detail": {"note": "uses {braces}"}} done"#,
        );
        assert_relative_eq!(result.threat_score, 0.5);
        assert_eq!(result.threat_type, "scam");
    }

    #[test]
    fn test_keyword_fallback_on_free_text() {
        let result = parse_model_response("This content is clearly malicious.");
        assert_relative_eq!(result.threat_score, 0.7);
        assert_eq!(result.threat_type, "unclassified");
        assert_relative_eq!(result.confidence, 0.4);
    }

    #[test]
    fn test_keyword_fallback_critical_tier() {
        let result = parse_model_response("Verdict: CRITICAL. Block immediately.");
        assert_relative_eq!(result.threat_score, 0.9);
    }

    #[test]
    fn test_keyword_fallback_benign() {
        let result = parse_model_response("This looks safe to me.");
        assert_relative_eq!(result.threat_score, 0.05);
    }

    #[test]
    fn test_unparseable_text_scores_zero() {
        let result = parse_model_response("lorem ipsum dolor sit amet");
        assert_relative_eq!(result.threat_score, 0.0);
        assert!(result.indicators.is_empty());
    }

    #[test]
    fn test_malformed_json_falls_through_to_keywords() {
        // Broken JSON must not poison the result; the text still mentions a tier
        let result = parse_model_response(r#"{"threat_score": oops} very suspicious content"#);
        assert_relative_eq!(result.threat_score, 0.5);
    }

    #[test]
    fn test_score_is_clamped() {
        let result = parse_model_response(r#"{"threat_score": 7.5, "threat_type": "x"}"#);
        assert_relative_eq!(result.threat_score, 1.0);
    }
}
