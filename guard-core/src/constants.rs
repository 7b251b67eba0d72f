//! Central Configuration Constants
//!
//! Single source of truth for detection thresholds, cache lifetimes and
//! job schedules. Components take these as defaults; the server may
//! override a few of them from the environment.

use std::path::PathBuf;

// ============================================================================
// DETECTION
// ============================================================================

/// A result at or above this confidence is "confident"
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Heuristic results below this confidence are not flagged as bots
pub const HEURISTIC_BOT_THRESHOLD: f64 = 0.5;

/// Lower bound of the ambiguous band that needs human review
pub const REVIEW_BAND_LOW: f64 = 0.4;

/// Maximum number of compiled regexes kept by the known-pattern detector
pub const REGEX_CACHE_MAX_SIZE: usize = 2048;

// ============================================================================
// AUTO-LEARNING
// ============================================================================

/// Minimum heuristic confidence before an unknown identifier is promoted
pub const LEARN_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Observations processed per auto-learner run
pub const LEARN_BATCH_SIZE: usize = 100;

/// Learned names shorter than this are rejected as too broad
pub const MIN_LEARNED_NAME_LEN: usize = 3;

/// Default auto-learner interval (hours)
pub const DEFAULT_LEARN_INTERVAL_HOURS: u64 = 24;

// ============================================================================
// EXTERNAL CATALOG SYNC
// ============================================================================

/// Default fetch timeout for remote signature lists (seconds)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default sync interval (hours) - weekly
pub const DEFAULT_SYNC_INTERVAL_HOURS: u64 = 168;

/// Confidence assigned to signatures imported from external lists
pub const EXTERNAL_SIGNATURE_CONFIDENCE: f64 = 0.90;

// ============================================================================
// IDENTITY VERIFICATION
// ============================================================================

/// Successful verifications are cached for 24 hours
pub const VERIFY_SUCCESS_TTL_SECS: i64 = 24 * 3600;

/// Failed verifications are cached for 6 hours
pub const VERIFY_FAILURE_TTL_SECS: i64 = 6 * 3600;

/// Default timeout per DNS lookup (milliseconds)
pub const DEFAULT_DNS_TIMEOUT_MS: u64 = 2000;

/// Lookup threads allowed at once, including ones still stuck after a timeout
pub const DNS_MAX_IN_FLIGHT: usize = 32;

/// Maximum cached verification verdicts
pub const VERIFY_CACHE_MAX_SIZE: usize = 10_000;

// ============================================================================
// SESSIONS
// ============================================================================

/// Gap (seconds) that closes a session
pub const SESSION_WINDOW_SECS: i64 = 1800;

/// How many recent visits feed the session statistics
pub const SESSION_HISTORY_LIMIT: usize = 100;

// ============================================================================
// RATE LIMITING
// ============================================================================

pub const MINUTE_WINDOW_SECS: i64 = 60;
pub const HOUR_WINDOW_SECS: i64 = 3600;

// ============================================================================
// STORAGE
// ============================================================================

/// App name (data directory)
pub const APP_NAME: &str = "crawlguard";

/// Default SQLite file name
pub const DATABASE_FILE: &str = "crawlguard.db";

/// Default database location: `<data_local_dir>/crawlguard/crawlguard.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join(DATABASE_FILE)
}

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// DNS timeout from environment or default
pub fn get_dns_timeout_ms() -> u64 {
    std::env::var("DNS_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_DNS_TIMEOUT_MS)
}

/// Fetch timeout from environment or default
pub fn get_fetch_timeout_secs() -> u64 {
    std::env::var("FETCH_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS)
}
