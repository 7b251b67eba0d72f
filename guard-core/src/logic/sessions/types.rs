//! Session / fingerprint types

use serde::{Deserialize, Serialize};

use crate::logic::field_digest;

/// Aggregated behaviour of one identifier + origin address pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitFingerprint {
    pub fingerprint_hash: String,
    pub identifier: String,
    pub origin_address: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub visit_count: u64,
    pub request_interval_avg: Option<f64>,
    pub request_interval_stddev: Option<f64>,
    pub pages_per_session_avg: Option<f64>,
    pub session_duration_avg: Option<f64>,
    pub unique_paths_ratio: Option<f64>,
    pub classification: String,
    /// Filled by the downstream scorer, never computed here
    pub bot_score: Option<f64>,
}

impl VisitFingerprint {
    pub fn first_sighting(visit: &Visit) -> Self {
        Self {
            fingerprint_hash: fingerprint_hash(&visit.identifier, &visit.origin_address),
            identifier: visit.identifier.clone(),
            origin_address: visit.origin_address.clone(),
            first_seen: visit.timestamp,
            last_seen: visit.timestamp,
            visit_count: 1,
            request_interval_avg: None,
            request_interval_stddev: None,
            pages_per_session_avg: None,
            session_duration_avg: None,
            unique_paths_ratio: None,
            classification: visit.classification.clone(),
            bot_score: None,
        }
    }
}

/// One recorded request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub identifier: String,
    pub origin_address: String,
    pub path: Option<String>,
    pub timestamp: i64,
    #[serde(default = "default_classification")]
    pub classification: String,
}

fn default_classification() -> String {
    "unknown".to_string()
}

impl Visit {
    pub fn new(identifier: &str, origin_address: &str, timestamp: i64) -> Self {
        Self {
            identifier: identifier.to_string(),
            origin_address: origin_address.to_string(),
            path: None,
            timestamp,
            classification: default_classification(),
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_classification(mut self, classification: &str) -> Self {
        self.classification = classification.to_string();
        self
    }
}

/// Stored history row read back for statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentVisit {
    pub path: Option<String>,
    pub timestamp: i64,
}

/// A cluster of visits with gaps under the session window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub start: i64,
    pub end: i64,
    pub page_count: u32,
}

impl Session {
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }
}

/// Statistics recomputed on every repeat visit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub request_interval_avg: Option<f64>,
    pub request_interval_stddev: Option<f64>,
    pub pages_per_session_avg: Option<f64>,
    pub session_duration_avg: Option<f64>,
    pub unique_paths_ratio: Option<f64>,
}

/// Fingerprint key for an identifier + origin address pair
pub fn fingerprint_hash(identifier: &str, origin_address: &str) -> String {
    field_digest(&[identifier, origin_address])
}
