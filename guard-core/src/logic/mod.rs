//! Logic Module - Detection, learning and traffic control engines
//!
//! ## Request path
//! - `detection/` - Known-pattern + heuristic detectors and the pipeline
//! - `verification/` - CIDR and reverse/forward DNS identity checks
//! - `sessions/` - Per-visitor fingerprints and session statistics
//! - `rate_limit/` - Minute/hour budgets per identity and origin
//! - `tiers.rs` - Priority tier and block list lookup
//!
//! ## Background jobs
//! - `learning/` - Unknown-identifier queue and the auto-learner
//! - `catalog_sync/` - Third-party signature list import
//!
//! ## Shared
//! - `events.rs` - Domain events and sinks

pub mod catalog_sync;
pub mod detection;
pub mod events;
pub mod learning;
pub mod rate_limit;
pub mod sessions;
pub mod tiers;
pub mod verification;

use sha2::{Digest, Sha256};

/// Current Unix time in seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// SHA-256 hex over length-prefixed fields, so no separator choice can
/// make two different field lists collide
pub fn field_digest(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_digest_separates_fields() {
        assert_ne!(field_digest(&["a|b", "c"]), field_digest(&["a", "b|c"]));
        assert_ne!(field_digest(&["ab", ""]), field_digest(&["a", "b"]));
        assert_eq!(field_digest(&["x", "y"]), field_digest(&["x", "y"]));
        assert_eq!(field_digest(&["x"]).len(), 64);
    }
}
