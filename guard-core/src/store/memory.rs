//! In-process store
//!
//! Each table sits behind its own lock so readers of one table never wait
//! on writers of another. Rate windows use `DashMap` so increments for
//! different keys do not contend.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::{
    FingerprintRepository, RateWindowRepository, SignatureRepository, StoreResult, SyncLogRepository,
    UnknownRepository, VisitRepository,
};
use crate::error::StoreError;
use crate::logic::catalog_sync::types::SyncRecord;
use crate::logic::detection::types::{NewSignature, Signature};
use crate::logic::learning::types::{ObservationStatus, Sighting, UnknownObservation, UpsertOutcome};
use crate::logic::rate_limit::types::RateWindow;
use crate::logic::sessions::types::{RecentVisit, SessionStats, VisitFingerprint};

// ============================================================================
// TABLES
// ============================================================================

#[derive(Default)]
struct SignatureTable {
    rows: Vec<Signature>,
    next_id: i64,
}

#[derive(Default)]
struct UnknownTable {
    by_hash: HashMap<String, UnknownObservation>,
    next_id: i64,
}

#[derive(Default)]
struct SyncLogTable {
    rows: Vec<SyncRecord>,
    next_id: i64,
}

// ============================================================================
// MEMORY STORE
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    signatures: RwLock<SignatureTable>,
    unknown: Mutex<UnknownTable>,
    sync_log: RwLock<SyncLogTable>,
    fingerprints: RwLock<HashMap<String, VisitFingerprint>>,
    /// Per fingerprint, ascending by timestamp
    visits: RwLock<HashMap<String, Vec<RecentVisit>>>,
    rate_windows: DashMap<String, RateWindow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in the unknown queue (any status)
    pub fn observation_count(&self) -> usize {
        self.unknown.lock().by_hash.len()
    }

    /// Number of signatures (any status)
    pub fn signature_count(&self) -> usize {
        self.signatures.read().rows.len()
    }
}

// ============================================================================
// SIGNATURES
// ============================================================================

impl SignatureRepository for MemoryStore {
    fn active_signatures(&self) -> StoreResult<Vec<Signature>> {
        Ok(self.signatures.read().rows.iter().filter(|s| s.is_active).cloned().collect())
    }

    fn get_signature(&self, id: i64) -> StoreResult<Option<Signature>> {
        Ok(self.signatures.read().rows.iter().find(|s| s.id == id).cloned())
    }

    fn find_by_pattern(&self, pattern: &str) -> StoreResult<Option<Signature>> {
        Ok(self.signatures.read().rows.iter().find(|s| s.pattern == pattern).cloned())
    }

    fn insert_signature(&self, new: &NewSignature, now: i64) -> StoreResult<Signature> {
        let mut table = self.signatures.write();
        if table.rows.iter().any(|s| s.pattern == new.pattern) {
            return Err(StoreError::Conflict(format!("pattern {}", new.pattern)));
        }
        table.next_id += 1;
        let signature = new.clone().into_signature(table.next_id, now);
        table.rows.push(signature.clone());
        Ok(signature)
    }

    fn update_signature_owner(
        &self,
        id: i64,
        bot_name: &str,
        source_version: Option<&str>,
        now: i64,
    ) -> StoreResult<()> {
        let mut table = self.signatures.write();
        let row = table
            .rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("signature {}", id)))?;
        row.bot_name = bot_name.to_string();
        row.source_version = source_version.map(|v| v.to_string());
        row.updated_at = now;
        Ok(())
    }

    fn set_signature_active(&self, id: i64, active: bool, now: i64) -> StoreResult<()> {
        let mut table = self.signatures.write();
        let row = table
            .rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("signature {}", id)))?;
        row.is_active = active;
        row.updated_at = now;
        Ok(())
    }

    fn record_signature_hit(&self, id: i64, now: i64) -> StoreResult<()> {
        let mut table = self.signatures.write();
        if let Some(row) = table.rows.iter_mut().find(|s| s.id == id) {
            row.visit_count += 1;
            row.last_seen = Some(now);
        }
        Ok(())
    }
}

// ============================================================================
// UNKNOWN QUEUE
// ============================================================================

impl UnknownRepository for MemoryStore {
    fn upsert_observation(&self, sighting: &Sighting) -> StoreResult<UpsertOutcome> {
        let mut table = self.unknown.lock();

        if let Some(existing) = table.by_hash.get_mut(&sighting.identifier_hash) {
            merge_sighting(existing, sighting);
            return Ok(UpsertOutcome { observation: existing.clone(), first_sighting: false });
        }

        table.next_id += 1;
        let observation = UnknownObservation {
            id: table.next_id,
            identifier: sighting.identifier.clone(),
            identifier_hash: sighting.identifier_hash.clone(),
            first_seen: sighting.seen_at,
            last_seen: sighting.seen_at,
            occurrence_count: 1,
            suggested_name: sighting.suggested_name.clone(),
            confidence: sighting.confidence,
            status: ObservationStatus::Pending,
        };
        table.by_hash.insert(sighting.identifier_hash.clone(), observation.clone());
        Ok(UpsertOutcome { observation, first_sighting: true })
    }

    fn find_observation(&self, identifier_hash: &str) -> StoreResult<Option<UnknownObservation>> {
        Ok(self.unknown.lock().by_hash.get(identifier_hash).cloned())
    }

    fn pending_observations(&self, min_confidence: f64, limit: usize) -> StoreResult<Vec<UnknownObservation>> {
        let table = self.unknown.lock();
        let mut rows: Vec<UnknownObservation> = table
            .by_hash
            .values()
            .filter(|o| o.status == ObservationStatus::Pending && o.confidence >= min_confidence)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then(a.id.cmp(&b.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    fn set_observation_status(&self, id: i64, status: ObservationStatus, _now: i64) -> StoreResult<()> {
        let mut table = self.unknown.lock();
        let row = table
            .by_hash
            .values_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("observation {}", id)))?;
        row.status = status;
        Ok(())
    }
}

/// Same merge rule the SQLite upsert applies in SQL
fn merge_sighting(existing: &mut UnknownObservation, sighting: &Sighting) {
    existing.occurrence_count += 1;
    existing.last_seen = existing.last_seen.max(sighting.seen_at);

    if sighting.confidence > existing.confidence {
        existing.confidence = sighting.confidence;
        if sighting.suggested_name.is_some() {
            existing.suggested_name = sighting.suggested_name.clone();
        }
    } else if existing.suggested_name.is_none() {
        existing.suggested_name = sighting.suggested_name.clone();
    }
}

// ============================================================================
// SYNC LOG
// ============================================================================

impl SyncLogRepository for MemoryStore {
    fn append_sync_record(&self, record: &SyncRecord) -> StoreResult<i64> {
        let mut table = self.sync_log.write();
        table.next_id += 1;
        let mut row = record.clone();
        row.id = table.next_id;
        table.rows.push(row);
        Ok(table.next_id)
    }

    fn recent_sync_records(&self, source_id: Option<&str>, limit: usize) -> StoreResult<Vec<SyncRecord>> {
        let table = self.sync_log.read();
        Ok(table
            .rows
            .iter()
            .rev()
            .filter(|r| source_id.map_or(true, |s| r.source_id == s))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ============================================================================
// FINGERPRINTS / VISITS
// ============================================================================

impl FingerprintRepository for MemoryStore {
    fn find_fingerprint(&self, hash: &str) -> StoreResult<Option<VisitFingerprint>> {
        Ok(self.fingerprints.read().get(hash).cloned())
    }

    fn insert_fingerprint(&self, fingerprint: &VisitFingerprint) -> StoreResult<()> {
        let mut table = self.fingerprints.write();
        if table.contains_key(&fingerprint.fingerprint_hash) {
            return Err(StoreError::Conflict(format!("fingerprint {}", fingerprint.fingerprint_hash)));
        }
        table.insert(fingerprint.fingerprint_hash.clone(), fingerprint.clone());
        Ok(())
    }

    fn increment_fingerprint_visits(&self, hash: &str, seen_at: i64, classification: &str) -> StoreResult<u64> {
        let mut table = self.fingerprints.write();
        let row = table
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(format!("fingerprint {}", hash)))?;
        row.visit_count += 1;
        row.last_seen = row.last_seen.max(seen_at);
        row.classification = classification.to_string();
        Ok(row.visit_count)
    }

    fn update_fingerprint_stats(&self, hash: &str, stats: &SessionStats) -> StoreResult<()> {
        let mut table = self.fingerprints.write();
        let row = table
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(format!("fingerprint {}", hash)))?;
        row.request_interval_avg = stats.request_interval_avg;
        row.request_interval_stddev = stats.request_interval_stddev;
        row.pages_per_session_avg = stats.pages_per_session_avg;
        row.session_duration_avg = stats.session_duration_avg;
        row.unique_paths_ratio = stats.unique_paths_ratio;
        Ok(())
    }
}

impl VisitRepository for MemoryStore {
    fn append_visit(&self, fingerprint_hash: &str, path: Option<&str>, timestamp: i64) -> StoreResult<()> {
        let mut visits = self.visits.write();
        let rows = visits.entry(fingerprint_hash.to_string()).or_default();
        // In-order arrivals land at the end; late ones slot in behind equal timestamps
        let at = rows.partition_point(|r| r.timestamp <= timestamp);
        rows.insert(at, RecentVisit { path: path.map(|p| p.to_string()), timestamp });
        Ok(())
    }

    fn recent_visits(&self, fingerprint_hash: &str, limit: usize) -> StoreResult<Vec<RecentVisit>> {
        let visits = self.visits.read();
        Ok(visits
            .get(fingerprint_hash)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// RATE WINDOWS
// ============================================================================

impl RateWindowRepository for MemoryStore {
    fn current_window(&self, key: &str, now: i64) -> StoreResult<Option<RateWindow>> {
        Ok(self.rate_windows.get(key).map(|w| *w).filter(|w| !w.is_expired(now)))
    }

    fn increment_window(&self, key: &str, window_secs: i64, now: i64) -> StoreResult<RateWindow> {
        // The entry guard holds the shard lock for the whole read-modify-write
        let mut entry = self
            .rate_windows
            .entry(key.to_string())
            .or_insert_with(|| RateWindow { count: 0, reset_at: now + window_secs });

        if entry.is_expired(now) {
            *entry = RateWindow::fresh(window_secs, now);
        } else {
            entry.count = entry.count.saturating_add(1);
        }
        Ok(*entry)
    }

    fn purge_expired_windows(&self, now: i64) -> StoreResult<usize> {
        let before = self.rate_windows.len();
        self.rate_windows.retain(|_, w| !w.is_expired(now));
        Ok(before.saturating_sub(self.rate_windows.len()))
    }
}
