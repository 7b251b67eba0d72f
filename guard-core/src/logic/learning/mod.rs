//! Learning Module - unknown-identifier queue and auto-learner
//!
//! Observation lifecycle:
//! pending -> auto_classified (promoted to a signature)
//! pending -> duplicate_pattern (pattern already owned)
//! pending -> rejected (no usable name; never re-examined)

pub mod auto_learner;
pub mod queue;
pub mod types;

pub use auto_learner::{extract_bot_name, generate_pattern, AutoLearner, LearnReport};
pub use queue::UnknownQueue;
pub use types::{identifier_hash, ObservationStatus, Sighting, UnknownObservation, UpsertOutcome};
