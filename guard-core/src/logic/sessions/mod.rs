//! Sessions Module - visit fingerprints and behavioural statistics

pub mod aggregator;
pub mod stats;
pub mod types;

pub use aggregator::SessionAggregator;
pub use types::{fingerprint_hash, RecentVisit, Session, SessionStats, Visit, VisitFingerprint};
