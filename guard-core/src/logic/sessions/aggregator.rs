//! Session Aggregator - per (identifier, origin) visit fingerprints

use std::sync::Arc;

use super::stats;
use super::types::{fingerprint_hash, Visit, VisitFingerprint};
use crate::constants::{SESSION_HISTORY_LIMIT, SESSION_WINDOW_SECS};
use crate::error::StoreError;
use crate::store::{FingerprintRepository, StoreResult, VisitRepository};

pub struct SessionAggregator {
    fingerprints: Arc<dyn FingerprintRepository>,
    visits: Arc<dyn VisitRepository>,
    session_window: i64,
    history_limit: usize,
}

impl SessionAggregator {
    pub fn new(fingerprints: Arc<dyn FingerprintRepository>, visits: Arc<dyn VisitRepository>) -> Self {
        Self {
            fingerprints,
            visits,
            session_window: SESSION_WINDOW_SECS,
            history_limit: SESSION_HISTORY_LIMIT,
        }
    }

    /// Statistics read at most this many of the newest visits
    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit.max(1);
        self
    }

    /// Record one visit and return the updated fingerprint
    pub fn record_visit(&self, visit: &Visit) -> StoreResult<VisitFingerprint> {
        let hash = fingerprint_hash(&visit.identifier, &visit.origin_address);
        self.visits.append_visit(&hash, visit.path.as_deref(), visit.timestamp)?;

        if self.fingerprints.find_fingerprint(&hash)?.is_none() {
            let fresh = VisitFingerprint::first_sighting(visit);
            match self.fingerprints.insert_fingerprint(&fresh) {
                Ok(()) => return Ok(fresh),
                // Lost the creation race; count this visit as a repeat
                Err(StoreError::Conflict(_)) => {
                    log::debug!("Fingerprint {} created concurrently", hash);
                }
                Err(e) => return Err(e),
            }
        }

        self.fingerprints.increment_fingerprint_visits(&hash, visit.timestamp, &visit.classification)?;
        let recent = self.visits.recent_visits(&hash, self.history_limit)?;
        let stats = stats::from_recent(&recent, self.session_window);
        self.fingerprints.update_fingerprint_stats(&hash, &stats)?;

        self.fingerprints
            .find_fingerprint(&hash)?
            .ok_or_else(|| StoreError::NotFound(format!("fingerprint {}", hash)))
    }

    pub fn fingerprint(&self, identifier: &str, origin_address: &str) -> StoreResult<Option<VisitFingerprint>> {
        self.fingerprints.find_fingerprint(&fingerprint_hash(identifier, origin_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};

    fn aggregators() -> Vec<SessionAggregator> {
        let memory = Arc::new(MemoryStore::new());
        let sqlite = Arc::new(SqliteStore::open_in_memory().unwrap());
        vec![
            SessionAggregator::new(memory.clone(), memory),
            SessionAggregator::new(sqlite.clone(), sqlite),
        ]
    }

    #[test]
    fn test_first_sighting_creates_fingerprint() {
        for agg in aggregators() {
            let fp = agg.record_visit(&Visit::new("GPTBot/1.0", "203.0.113.5", 1_000).with_path("/")).unwrap();
            assert_eq!(fp.visit_count, 1);
            assert_eq!(fp.first_seen, 1_000);
            assert_eq!(fp.request_interval_avg, None);
            assert_eq!(fp.fingerprint_hash, fingerprint_hash("GPTBot/1.0", "203.0.113.5"));
        }
    }

    #[test]
    fn test_repeat_visits_recompute_stats() {
        for agg in aggregators() {
            let visits = [(0, "/a"), (300, "/b"), (600, "/a"), (2700, "/a"), (3000, "/b")];
            let mut last = None;
            for (ts, path) in visits {
                last = Some(
                    agg.record_visit(&Visit::new("ClaudeBot", "3.128.0.9", ts).with_path(path).with_classification("ai"))
                        .unwrap(),
                );
            }
            let fp = last.unwrap();
            assert_eq!(fp.visit_count, 5);
            assert_eq!(fp.last_seen, 3000);
            assert_eq!(fp.classification, "ai");
            assert_eq!(fp.request_interval_avg, Some(750.0));
            assert_eq!(fp.pages_per_session_avg, Some(2.5));
            assert_eq!(fp.session_duration_avg, Some(450.0));
            assert_eq!(fp.unique_paths_ratio, Some(0.4));
            assert_eq!(fp.bot_score, None);

            let looked_up = agg.fingerprint("ClaudeBot", "3.128.0.9").unwrap().unwrap();
            assert_eq!(looked_up, fp);
        }
    }

    #[test]
    fn test_stats_only_read_the_recent_window() {
        for agg in aggregators() {
            let agg = agg.with_history_limit(3);
            let visits = [(0, "/a"), (10, "/b"), (5_000, "/c"), (5_060, "/c"), (5_120, "/c")];
            let mut last = None;
            for (ts, path) in visits {
                last = Some(agg.record_visit(&Visit::new("ScanBot", "192.0.2.44", ts).with_path(path)).unwrap());
            }
            let fp = last.unwrap();
            // Lifetime counter keeps growing; stats see only the newest three
            assert_eq!(fp.visit_count, 5);
            assert_eq!(fp.request_interval_avg, Some(60.0));
            assert_eq!(fp.request_interval_stddev, Some(0.0));
            assert_eq!(fp.pages_per_session_avg, Some(3.0));
            assert_eq!(fp.session_duration_avg, Some(120.0));
            assert_eq!(fp.unique_paths_ratio, Some(0.33));
        }
    }

    #[test]
    fn test_origin_address_separates_fingerprints() {
        for agg in aggregators() {
            agg.record_visit(&Visit::new("Bingbot", "198.51.100.1", 10)).unwrap();
            let other = agg.record_visit(&Visit::new("Bingbot", "198.51.100.2", 20)).unwrap();
            assert_eq!(other.visit_count, 1);
            assert!(agg.fingerprint("Bingbot", "198.51.100.3").unwrap().is_none());
        }
    }
}
