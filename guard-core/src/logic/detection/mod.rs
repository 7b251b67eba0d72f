//! Detection Module - identifier classification
//!
//! # Components
//! - `known_pattern.rs`: catalog lookup, compiled-regex cache
//! - `heuristic.rs`: weighted structural indicators
//! - `pipeline.rs`: known -> heuristic with early exit; queues low-confidence results
//! - `catalog.rs`: built-in crawler signatures

pub mod catalog;
pub mod heuristic;
pub mod known_pattern;
pub mod pipeline;
pub mod types;

pub use catalog::{builtin_signatures, seed_builtin};
pub use heuristic::HeuristicDetector;
pub use known_pattern::{compile_pattern, KnownPatternDetector};
pub use pipeline::DetectionPipeline;
pub use types::{
    BotCategory, DetectionMethod, DetectionResult, NewSignature, PatternType, PriorityTier, Signature,
    SignatureSource,
};
