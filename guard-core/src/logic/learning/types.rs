//! Unknown-identifier queue types

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Classification status of a queued identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    Pending,
    AutoClassified,
    DuplicatePattern,
    /// No usable name could be derived; never re-examined
    Rejected,
}

impl ObservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationStatus::Pending => "pending",
            ObservationStatus::AutoClassified => "auto_classified",
            ObservationStatus::DuplicatePattern => "duplicate_pattern",
            ObservationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ObservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ObservationStatus::Pending),
            "auto_classified" => Ok(ObservationStatus::AutoClassified),
            "duplicate_pattern" => Ok(ObservationStatus::DuplicatePattern),
            "rejected" => Ok(ObservationStatus::Rejected),
            other => Err(format!("unknown observation status: {}", other)),
        }
    }
}

/// One row of the unknown-identifier queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownObservation {
    pub id: i64,
    pub identifier: String,
    pub identifier_hash: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub occurrence_count: u64,
    pub suggested_name: Option<String>,
    pub confidence: f64,
    pub status: ObservationStatus,
}

/// A single low-confidence sighting to merge into the queue
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub identifier: String,
    pub identifier_hash: String,
    pub suggested_name: Option<String>,
    pub confidence: f64,
    pub seen_at: i64,
}

impl Sighting {
    pub fn new(identifier: &str, suggested_name: Option<&str>, confidence: f64, seen_at: i64) -> Self {
        Self {
            identifier: identifier.to_string(),
            identifier_hash: identifier_hash(identifier),
            suggested_name: suggested_name.map(|s| s.to_string()),
            confidence: confidence.clamp(0.0, 1.0),
            seen_at,
        }
    }
}

/// Result of an insert-or-update
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub observation: UnknownObservation,
    pub first_sighting: bool,
}

/// SHA-256 hex of the raw identifier (queue unique key)
pub fn identifier_hash(identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hex::encode(hasher.finalize())
}
