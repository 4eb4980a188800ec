//! Vigil Daemon - Resilient multi-source threat analysis gateway.
//!
//! Fans a content-analysis request out to independent upstream sources
//! (generative-AI inference and web-search verification), each behind its
//! own circuit breaker, falls back to a local heuristic analyzer, collapses
//! duplicate requests through a content-addressed single-flight cache, and
//! merges partial results into one confidence-weighted verdict.

pub mod aggregator;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod error;
pub mod heuristic;
pub mod patterns;
pub mod ratelimit;
pub mod routes;
pub mod server;
pub mod tasks;
pub mod upstream;
