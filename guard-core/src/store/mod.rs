//! Store Module - Repository interfaces over the shared backing store
//!
//! Every component receives the repository it needs as an `Arc<dyn ...>`;
//! nothing keeps process-wide registries. Two backends ship:
//! - `memory.rs` - in-process tables (tests, single-process deployments)
//! - `sqlite.rs` - SQLite file shared by worker processes
//!
//! All methods must be safe under concurrent readers and writers.

pub mod memory;
pub mod sqlite;


pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::logic::catalog_sync::types::SyncRecord;
use crate::logic::detection::types::{NewSignature, Signature};
use crate::logic::learning::types::{ObservationStatus, Sighting, UnknownObservation, UpsertOutcome};
use crate::logic::rate_limit::types::RateWindow;
use crate::logic::sessions::types::{RecentVisit, SessionStats, VisitFingerprint};

pub type StoreResult<T> = Result<T, StoreError>;

/// Signature catalog (unique by pattern string)
pub trait SignatureRepository: Send + Sync {
    fn active_signatures(&self) -> StoreResult<Vec<Signature>>;

    fn get_signature(&self, id: i64) -> StoreResult<Option<Signature>>;

    /// Any signature, active or not, owning exactly this pattern
    fn find_by_pattern(&self, pattern: &str) -> StoreResult<Option<Signature>>;

    /// Fails with `StoreError::Conflict` when the pattern already exists
    fn insert_signature(&self, new: &NewSignature, now: i64) -> StoreResult<Signature>;

    fn update_signature_owner(
        &self,
        id: i64,
        bot_name: &str,
        source_version: Option<&str>,
        now: i64,
    ) -> StoreResult<()>;

    fn set_signature_active(&self, id: i64, active: bool, now: i64) -> StoreResult<()>;

    /// Usage counters: visit_count += 1, last_seen = now
    fn record_signature_hit(&self, id: i64, now: i64) -> StoreResult<()>;
}

/// Unknown-identifier queue (unique by identifier hash)
pub trait UnknownRepository: Send + Sync {
    /// Atomic insert-or-update; keeps the best confidence and its name
    fn upsert_observation(&self, sighting: &Sighting) -> StoreResult<UpsertOutcome>;

    fn find_observation(&self, identifier_hash: &str) -> StoreResult<Option<UnknownObservation>>;

    /// Pending rows with confidence >= `min_confidence`, highest first
    fn pending_observations(&self, min_confidence: f64, limit: usize) -> StoreResult<Vec<UnknownObservation>>;

    fn set_observation_status(&self, id: i64, status: ObservationStatus, now: i64) -> StoreResult<()>;
}

/// Append-only sync history
pub trait SyncLogRepository: Send + Sync {
    fn append_sync_record(&self, record: &SyncRecord) -> StoreResult<i64>;

    /// Newest first
    fn recent_sync_records(&self, source_id: Option<&str>, limit: usize) -> StoreResult<Vec<SyncRecord>>;
}

/// Visit fingerprints (unique by fingerprint hash)
pub trait FingerprintRepository: Send + Sync {
    fn find_fingerprint(&self, hash: &str) -> StoreResult<Option<VisitFingerprint>>;

    /// Fails with `StoreError::Conflict` when the hash already exists
    fn insert_fingerprint(&self, fingerprint: &VisitFingerprint) -> StoreResult<()>;

    /// Atomically bumps visit_count and last_seen; returns the new count
    fn increment_fingerprint_visits(&self, hash: &str, seen_at: i64, classification: &str) -> StoreResult<u64>;

    fn update_fingerprint_stats(&self, hash: &str, stats: &SessionStats) -> StoreResult<()>;
}

/// Raw visit history feeding session statistics
pub trait VisitRepository: Send + Sync {
    fn append_visit(&self, fingerprint_hash: &str, path: Option<&str>, timestamp: i64) -> StoreResult<()>;

    /// Most recent first, at most `limit`. Cost is bounded by `limit`,
    /// not by the length of the history.
    fn recent_visits(&self, fingerprint_hash: &str, limit: usize) -> StoreResult<Vec<RecentVisit>>;
}

/// Ephemeral, self-expiring rate counters
pub trait RateWindowRepository: Send + Sync {
    /// Live window for `key`; expired windows read as `None`
    fn current_window(&self, key: &str, now: i64) -> StoreResult<Option<RateWindow>>;

    /// Atomic increment-or-create; an expired window restarts at 1
    fn increment_window(&self, key: &str, window_secs: i64, now: i64) -> StoreResult<RateWindow>;

    fn purge_expired_windows(&self, now: i64) -> StoreResult<usize>;
}

/// Everything a full deployment needs from one backend
pub trait GuardStore:
    SignatureRepository
    + UnknownRepository
    + SyncLogRepository
    + FingerprintRepository
    + VisitRepository
    + RateWindowRepository
{
}

impl<T> GuardStore for T where
    T: SignatureRepository
        + UnknownRepository
        + SyncLogRepository
        + FingerprintRepository
        + VisitRepository
        + RateWindowRepository
{
}
