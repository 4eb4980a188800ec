//! Local heuristic analyzer.
//!
//! Pure keyword scoring over the content, no I/O and no suspension points.
//! Always computed as a baseline; it is the fallback of last resort when
//! both upstreams are unavailable. Indicator patterns are swapped in from
//! the pattern store by a background refresh task.

use std::sync::RwLock;
use vigil_common::{SourceKind, SourceResult, ThreatPattern};

/// Heuristic confidence is deliberately modest: keyword matching is cheap
/// evidence, never authoritative.
const BASE_CONFIDENCE: f64 = 0.3;
const CONFIDENCE_PER_MATCH: f64 = 0.05;
const MAX_CONFIDENCE: f64 = 0.6;

pub struct HeuristicAnalyzer {
    patterns: RwLock<Vec<ThreatPattern>>,
}

impl HeuristicAnalyzer {
    pub fn new(patterns: Vec<ThreatPattern>) -> Self {
        Self {
            patterns: RwLock::new(patterns),
        }
    }

    /// Replace the indicator set (called by the pattern refresh task).
    pub fn replace_patterns(&self, patterns: Vec<ThreatPattern>) {
        *self.patterns.write().expect("pattern lock poisoned") = patterns;
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.read().expect("pattern lock poisoned").len()
    }

    /// Score the content against the indicator set. Per threat type, keyword
    /// weights accumulate with diminishing returns; the verdict is the
    /// highest-scoring type. A type hint breaks score ties.
    pub fn analyze(&self, content: &str, threat_type_hint: Option<&str>) -> SourceResult {
        let haystack = content.to_lowercase();
        let patterns = self.patterns.read().expect("pattern lock poisoned");

        // type -> (score, matched keywords)
        let mut scores: Vec<(String, f64, Vec<String>)> = Vec::new();

        for pattern in patterns.iter() {
            if !haystack.contains(&pattern.keyword) {
                continue;
            }
            match scores.iter_mut().find(|(t, _, _)| *t == pattern.threat_type) {
                Some((_, score, matched)) => {
                    // Diminishing returns keep stacked weak signals below 1.0
                    *score += (1.0 - *score) * pattern.weight;
                    matched.push(pattern.keyword.clone());
                }
                None => scores.push((
                    pattern.threat_type.clone(),
                    pattern.weight,
                    vec![pattern.keyword.clone()],
                )),
            }
        }

        if scores.is_empty() {
            return SourceResult {
                source: SourceKind::Heuristic,
                threat_score: 0.0,
                threat_type: "benign".to_string(),
                confidence: BASE_CONFIDENCE,
                indicators: Vec::new(),
                error: None,
            };
        }

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    // Tie: prefer the caller's hinted type
                    let a_hinted = threat_type_hint == Some(a.0.as_str());
                    let b_hinted = threat_type_hint == Some(b.0.as_str());
                    b_hinted.cmp(&a_hinted)
                })
        });

        let (threat_type, score, indicators) = scores.into_iter().next().unwrap();
        let match_count = indicators.len();

        SourceResult {
            source: SourceKind::Heuristic,
            threat_score: score.min(1.0),
            threat_type,
            confidence: (BASE_CONFIDENCE + CONFIDENCE_PER_MATCH * match_count as f64)
                .min(MAX_CONFIDENCE),
            indicators,
            error: None,
        }
    }
}
