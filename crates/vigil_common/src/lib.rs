//! Vigil Common - Shared types and schemas for the threat analysis gateway.
//!
//! Wire types only: no I/O, no resilience logic. Everything the daemon and
//! its callers exchange lives here.

pub mod fingerprint;
pub mod schemas;

pub use fingerprint::*;
pub use schemas::*;
