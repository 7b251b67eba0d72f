//! SQLite store
//!
//! One connection behind a mutex; WAL mode plus a busy timeout lets several
//! worker processes share the same file. Every read-modify-write is a
//! single statement (`ON CONFLICT ... DO UPDATE ... RETURNING`) so
//! concurrent writers never lose increments.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    FingerprintRepository, RateWindowRepository, SignatureRepository, StoreResult, SyncLogRepository,
    UnknownRepository, VisitRepository,
};
use crate::error::StoreError;
use crate::logic::catalog_sync::types::{SyncRecord, SyncStatus};
use crate::logic::detection::types::{NewSignature, Signature};
use crate::logic::learning::types::{ObservationStatus, Sighting, UnknownObservation, UpsertOutcome};
use crate::logic::rate_limit::types::RateWindow;
use crate::logic::sessions::types::{RecentVisit, SessionStats, VisitFingerprint};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("create {}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        run_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

/// Apply the schema; every statement is idempotent
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    log::info!("Database schema applied");
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Signature catalog
CREATE TABLE IF NOT EXISTS signatures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern TEXT NOT NULL UNIQUE,
    pattern_type TEXT NOT NULL DEFAULT 'regex',
    bot_name TEXT NOT NULL,
    bot_vendor TEXT,
    category TEXT NOT NULL DEFAULT 'other',
    priority TEXT NOT NULL DEFAULT 'medium',
    confidence REAL NOT NULL DEFAULT 1.0,
    is_active INTEGER NOT NULL DEFAULT 1,
    visit_count INTEGER NOT NULL DEFAULT 0,
    last_seen INTEGER,
    source TEXT NOT NULL DEFAULT 'manual',
    source_version TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_signatures_active ON signatures(is_active);

-- Unknown-identifier queue
CREATE TABLE IF NOT EXISTS unknown_observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL,
    identifier_hash TEXT NOT NULL UNIQUE,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    occurrence_count INTEGER NOT NULL DEFAULT 1,
    suggested_name TEXT,
    confidence REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending'
);

CREATE INDEX IF NOT EXISTS idx_unknown_status_conf ON unknown_observations(status, confidence);

-- Sync history
CREATE TABLE IF NOT EXISTS sync_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    source_version TEXT NOT NULL,
    added INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    total INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    error_message TEXT,
    synced_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_history_source ON sync_history(source_id, synced_at);

-- Visit fingerprints
CREATE TABLE IF NOT EXISTS fingerprints (
    fingerprint_hash TEXT PRIMARY KEY,
    identifier TEXT NOT NULL,
    origin_address TEXT NOT NULL,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    visit_count INTEGER NOT NULL DEFAULT 1,
    request_interval_avg REAL,
    request_interval_stddev REAL,
    pages_per_session_avg REAL,
    session_duration_avg REAL,
    unique_paths_ratio REAL,
    classification TEXT NOT NULL DEFAULT 'unknown',
    bot_score REAL
);

-- Raw visits
CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint_hash TEXT NOT NULL,
    path TEXT,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visits_fingerprint ON visits(fingerprint_hash, timestamp);

-- Rate-limit windows
CREATE TABLE IF NOT EXISTS rate_windows (
    window_key TEXT PRIMARY KEY,
    count INTEGER NOT NULL,
    reset_at INTEGER NOT NULL
);
"#;

// ============================================================================
// ROW MAPPING
// ============================================================================

const SIGNATURE_COLUMNS: &str = "id, pattern, pattern_type, bot_name, bot_vendor, category, priority, \
     confidence, is_active, visit_count, last_seen, source, source_version, created_at, updated_at";

const OBSERVATION_COLUMNS: &str = "id, identifier, identifier_hash, first_seen, last_seen, \
     occurrence_count, suggested_name, confidence, status";

const SYNC_COLUMNS: &str =
    "id, source_id, source_version, added, updated, total, skipped, status, error_message, synced_at";

const FINGERPRINT_COLUMNS: &str = "fingerprint_hash, identifier, origin_address, first_seen, last_seen, \
     visit_count, request_interval_avg, request_interval_stddev, pages_per_session_avg, \
     session_duration_avg, unique_paths_ratio, classification, bot_score";

/// Parse a TEXT enum column, reporting unknown values as a conversion failure
fn text_enum<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn count(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

fn signature_from_row(row: &Row<'_>) -> rusqlite::Result<Signature> {
    Ok(Signature {
        id: row.get(0)?,
        pattern: row.get(1)?,
        pattern_type: text_enum(row, 2)?,
        bot_name: row.get(3)?,
        bot_vendor: row.get(4)?,
        category: text_enum(row, 5)?,
        priority: text_enum(row, 6)?,
        confidence: row.get(7)?,
        is_active: row.get(8)?,
        visit_count: count(row, 9)?,
        last_seen: row.get(10)?,
        source: text_enum(row, 11)?,
        source_version: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<UnknownObservation> {
    Ok(UnknownObservation {
        id: row.get(0)?,
        identifier: row.get(1)?,
        identifier_hash: row.get(2)?,
        first_seen: row.get(3)?,
        last_seen: row.get(4)?,
        occurrence_count: count(row, 5)?,
        suggested_name: row.get(6)?,
        confidence: row.get(7)?,
        status: text_enum(row, 8)?,
    })
}

fn sync_record_from_row(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    Ok(SyncRecord {
        id: row.get(0)?,
        source_id: row.get(1)?,
        source_version: row.get(2)?,
        added: count(row, 3)? as usize,
        updated: count(row, 4)? as usize,
        total: count(row, 5)? as usize,
        skipped: count(row, 6)? as usize,
        status: text_enum::<SyncStatus>(row, 7)?,
        error_message: row.get(8)?,
        synced_at: row.get(9)?,
    })
}

fn fingerprint_from_row(row: &Row<'_>) -> rusqlite::Result<VisitFingerprint> {
    Ok(VisitFingerprint {
        fingerprint_hash: row.get(0)?,
        identifier: row.get(1)?,
        origin_address: row.get(2)?,
        first_seen: row.get(3)?,
        last_seen: row.get(4)?,
        visit_count: count(row, 5)?,
        request_interval_avg: row.get(6)?,
        request_interval_stddev: row.get(7)?,
        pages_per_session_avg: row.get(8)?,
        session_duration_avg: row.get(9)?,
        unique_paths_ratio: row.get(10)?,
        classification: row.get(11)?,
        bot_score: row.get(12)?,
    })
}

fn not_found_if_zero(changed: usize, what: String) -> StoreResult<()> {
    if changed == 0 {
        Err(StoreError::NotFound(what))
    } else {
        Ok(())
    }
}

// ============================================================================
// SIGNATURES
// ============================================================================

impl SignatureRepository for SqliteStore {
    fn active_signatures(&self) -> StoreResult<Vec<Signature>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM signatures WHERE is_active = 1 ORDER BY id",
            SIGNATURE_COLUMNS
        ))?;
        let rows = stmt.query_map([], signature_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_signature(&self, id: i64) -> StoreResult<Option<Signature>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM signatures WHERE id = ?1", SIGNATURE_COLUMNS),
                params![id],
                signature_from_row,
            )
            .optional()?)
    }

    fn find_by_pattern(&self, pattern: &str) -> StoreResult<Option<Signature>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM signatures WHERE pattern = ?1", SIGNATURE_COLUMNS),
                params![pattern],
                signature_from_row,
            )
            .optional()?)
    }

    fn insert_signature(&self, new: &NewSignature, now: i64) -> StoreResult<Signature> {
        let conn = self.conn.lock();
        let signature = conn.query_row(
            &format!(
                "INSERT INTO signatures (pattern, pattern_type, bot_name, bot_vendor, category, priority, \
                 confidence, is_active, visit_count, source, source_version, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, ?8, ?9, ?10, ?10) RETURNING {}",
                SIGNATURE_COLUMNS
            ),
            params![
                new.pattern,
                new.pattern_type.as_str(),
                new.bot_name,
                new.bot_vendor,
                new.category.as_str(),
                new.priority.as_str(),
                new.confidence.clamp(0.0, 1.0),
                new.source.as_str(),
                new.source_version,
                now,
            ],
            signature_from_row,
        )?;
        Ok(signature)
    }

    fn update_signature_owner(
        &self,
        id: i64,
        bot_name: &str,
        source_version: Option<&str>,
        now: i64,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE signatures SET bot_name = ?2, source_version = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, bot_name, source_version, now],
        )?;
        not_found_if_zero(changed, format!("signature {}", id))
    }

    fn set_signature_active(&self, id: i64, active: bool, now: i64) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE signatures SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, active, now],
        )?;
        not_found_if_zero(changed, format!("signature {}", id))
    }

    fn record_signature_hit(&self, id: i64, now: i64) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE signatures SET visit_count = visit_count + 1, last_seen = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    }
}

// ============================================================================
// UNKNOWN QUEUE
// ============================================================================

impl UnknownRepository for SqliteStore {
    fn upsert_observation(&self, sighting: &Sighting) -> StoreResult<UpsertOutcome> {
        let conn = self.conn.lock();
        // Right-hand side column references read the pre-update row
        let observation = conn.query_row(
            &format!(
                "INSERT INTO unknown_observations \
                 (identifier, identifier_hash, first_seen, last_seen, occurrence_count, suggested_name, confidence, status) \
                 VALUES (?1, ?2, ?3, ?3, 1, ?4, ?5, 'pending') \
                 ON CONFLICT(identifier_hash) DO UPDATE SET \
                     occurrence_count = occurrence_count + 1, \
                     last_seen = MAX(last_seen, excluded.last_seen), \
                     suggested_name = CASE \
                         WHEN excluded.confidence > confidence AND excluded.suggested_name IS NOT NULL \
                             THEN excluded.suggested_name \
                         WHEN suggested_name IS NULL THEN excluded.suggested_name \
                         ELSE suggested_name END, \
                     confidence = MAX(confidence, excluded.confidence) \
                 RETURNING {}",
                OBSERVATION_COLUMNS
            ),
            params![
                sighting.identifier,
                sighting.identifier_hash,
                sighting.seen_at,
                sighting.suggested_name,
                sighting.confidence,
            ],
            observation_from_row,
        )?;
        let first_sighting = observation.occurrence_count == 1;
        Ok(UpsertOutcome { observation, first_sighting })
    }

    fn find_observation(&self, identifier_hash: &str) -> StoreResult<Option<UnknownObservation>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM unknown_observations WHERE identifier_hash = ?1",
                    OBSERVATION_COLUMNS
                ),
                params![identifier_hash],
                observation_from_row,
            )
            .optional()?)
    }

    fn pending_observations(&self, min_confidence: f64, limit: usize) -> StoreResult<Vec<UnknownObservation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM unknown_observations \
             WHERE status = 'pending' AND confidence >= ?1 \
             ORDER BY confidence DESC, id ASC LIMIT ?2",
            OBSERVATION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![min_confidence, limit as i64], observation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn set_observation_status(&self, id: i64, status: ObservationStatus, _now: i64) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE unknown_observations SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        not_found_if_zero(changed, format!("observation {}", id))
    }
}

// ============================================================================
// SYNC LOG
// ============================================================================

impl SyncLogRepository for SqliteStore {
    fn append_sync_record(&self, record: &SyncRecord) -> StoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sync_history \
             (source_id, source_version, added, updated, total, skipped, status, error_message, synced_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.source_id,
                record.source_version,
                record.added as i64,
                record.updated as i64,
                record.total as i64,
                record.skipped as i64,
                record.status.as_str(),
                record.error_message,
                record.synced_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_sync_records(&self, source_id: Option<&str>, limit: usize) -> StoreResult<Vec<SyncRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_history \
             WHERE ?1 IS NULL OR source_id = ?1 \
             ORDER BY id DESC LIMIT ?2",
            SYNC_COLUMNS
        ))?;
        let rows = stmt.query_map(params![source_id, limit as i64], sync_record_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ============================================================================
// FINGERPRINTS / VISITS
// ============================================================================

impl FingerprintRepository for SqliteStore {
    fn find_fingerprint(&self, hash: &str) -> StoreResult<Option<VisitFingerprint>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM fingerprints WHERE fingerprint_hash = ?1", FINGERPRINT_COLUMNS),
                params![hash],
                fingerprint_from_row,
            )
            .optional()?)
    }

    fn insert_fingerprint(&self, fp: &VisitFingerprint) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO fingerprints ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                FINGERPRINT_COLUMNS
            ),
            params![
                fp.fingerprint_hash,
                fp.identifier,
                fp.origin_address,
                fp.first_seen,
                fp.last_seen,
                fp.visit_count as i64,
                fp.request_interval_avg,
                fp.request_interval_stddev,
                fp.pages_per_session_avg,
                fp.session_duration_avg,
                fp.unique_paths_ratio,
                fp.classification,
                fp.bot_score,
            ],
        )?;
        Ok(())
    }

    fn increment_fingerprint_visits(&self, hash: &str, seen_at: i64, classification: &str) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let visits: i64 = conn.query_row(
            "UPDATE fingerprints SET visit_count = visit_count + 1, \
                 last_seen = MAX(last_seen, ?2), classification = ?3 \
             WHERE fingerprint_hash = ?1 RETURNING visit_count",
            params![hash, seen_at, classification],
            |row| row.get(0),
        )?;
        Ok(visits.max(0) as u64)
    }

    fn update_fingerprint_stats(&self, hash: &str, stats: &SessionStats) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE fingerprints SET request_interval_avg = ?2, request_interval_stddev = ?3, \
                 pages_per_session_avg = ?4, session_duration_avg = ?5, unique_paths_ratio = ?6 \
             WHERE fingerprint_hash = ?1",
            params![
                hash,
                stats.request_interval_avg,
                stats.request_interval_stddev,
                stats.pages_per_session_avg,
                stats.session_duration_avg,
                stats.unique_paths_ratio,
            ],
        )?;
        not_found_if_zero(changed, format!("fingerprint {}", hash))
    }
}

impl VisitRepository for SqliteStore {
    fn append_visit(&self, fingerprint_hash: &str, path: Option<&str>, timestamp: i64) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO visits (fingerprint_hash, path, timestamp) VALUES (?1, ?2, ?3)",
            params![fingerprint_hash, path, timestamp],
        )?;
        Ok(())
    }

    fn recent_visits(&self, fingerprint_hash: &str, limit: usize) -> StoreResult<Vec<RecentVisit>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT path, timestamp FROM visits WHERE fingerprint_hash = ?1 \
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![fingerprint_hash, limit as i64], |row| {
            Ok(RecentVisit { path: row.get(0)?, timestamp: row.get(1)? })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ============================================================================
// RATE WINDOWS
// ============================================================================

impl RateWindowRepository for SqliteStore {
    fn current_window(&self, key: &str, now: i64) -> StoreResult<Option<RateWindow>> {
        let conn = self.conn.lock();
        let window = conn
            .query_row(
                "SELECT count, reset_at FROM rate_windows WHERE window_key = ?1",
                params![key],
                |row| {
                    Ok(RateWindow {
                        count: row.get::<_, i64>(0)?.clamp(0, u32::MAX as i64) as u32,
                        reset_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(window.filter(|w| !w.is_expired(now)))
    }

    fn increment_window(&self, key: &str, window_secs: i64, now: i64) -> StoreResult<RateWindow> {
        let conn = self.conn.lock();
        let window = conn.query_row(
            "INSERT INTO rate_windows (window_key, count, reset_at) VALUES (?1, 1, ?2 + ?3) \
             ON CONFLICT(window_key) DO UPDATE SET \
                 count = CASE WHEN reset_at <= ?2 THEN 1 ELSE count + 1 END, \
                 reset_at = CASE WHEN reset_at <= ?2 THEN ?2 + ?3 ELSE reset_at END \
             RETURNING count, reset_at",
            params![key, now, window_secs],
            |row| {
                Ok(RateWindow {
                    count: row.get::<_, i64>(0)?.clamp(0, u32::MAX as i64) as u32,
                    reset_at: row.get(1)?,
                })
            },
        )?;
        Ok(window)
    }

    fn purge_expired_windows(&self, now: i64) -> StoreResult<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM rate_windows WHERE reset_at <= ?1", params![now])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undecodable_row_is_reported_corrupt() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO unknown_observations \
                 (identifier, identifier_hash, first_seen, last_seen, occurrence_count, suggested_name, confidence, status) \
                 VALUES ('x', 'h', 1, 1, 1, NULL, 0.9, 'archived')",
                [],
            )
            .unwrap();

        let err = store.find_observation("h").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(msg) if msg.contains("archived")));
    }
}
