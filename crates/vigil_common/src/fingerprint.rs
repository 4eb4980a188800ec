//! Content-addressed request fingerprints.
//!
//! Two requests with identical fingerprints are the same analysis: the
//! fingerprint keys the dedup cache and the single-flight lock.

use crate::schemas::AnalysisRequest;
use sha2::{Digest, Sha256};

/// Context keys that participate in the fingerprint. Everything else in the
/// caller context is presentation detail and must not fragment the cache.
const FINGERPRINT_CONTEXT_KEYS: &[&str] = &["origin", "field", "language"];

/// Deterministic SHA-256 fingerprint over the analysis-relevant request
/// fields, hex encoded.
pub fn fingerprint(request: &AnalysisRequest) -> String {
    let mut hasher = Sha256::new();

    hasher.update(request.content.as_bytes());
    hasher.update([0u8]);

    if let Some(hint) = &request.threat_type_hint {
        hasher.update(hint.as_bytes());
    }
    hasher.update([0u8]);

    // Fixed key order keeps the hash independent of map iteration order
    for key in FINGERPRINT_CONTEXT_KEYS {
        if let Some(value) = request.context.get(*key) {
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
    }

    hex::encode(hasher.finalize())
}
