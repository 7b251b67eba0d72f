//! Catalog sync types

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// FEED SOURCES
// ============================================================================

/// Payload layout of a remote signature list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFormat {
    /// `{name: pattern}`, `[pattern]` or `[{pattern, name?}]`
    Json,
    /// PHP `array(...)` / `[...]` literal of quoted strings
    PhpArray,
    /// One pattern per line
    Lines,
}

/// A configured remote signature list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: String,
    pub name: String,
    pub url: String,
    pub format: FeedFormat,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_version() -> String {
    "latest".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Sources synced when nothing else is configured
pub fn default_sources() -> Vec<FeedSource> {
    vec![FeedSource {
        id: "crawler-detect".to_string(),
        name: "Crawler-Detect".to_string(),
        url: "https://raw.githubusercontent.com/JayBizzle/Crawler-Detect/master/src/Fixtures/Crawlers.php"
            .to_string(),
        format: FeedFormat::PhpArray,
        version: default_version(),
        enabled: true,
    }]
}

// ============================================================================
// SYNC RESULT
// ============================================================================

/// Counts from one successful sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub total: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    /// Parsed fine but some entries were skipped
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SyncStatus::Success),
            "partial" => Ok(SyncStatus::Partial),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status: {}", other)),
        }
    }
}

/// Durable sync-history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: i64,
    pub source_id: String,
    pub source_version: String,
    pub added: usize,
    pub updated: usize,
    pub total: usize,
    pub skipped: usize,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub synced_at: i64,
}

impl SyncRecord {
    pub fn success(source_id: &str, version: &str, summary: &SyncSummary, now: i64) -> Self {
        Self {
            id: 0,
            source_id: source_id.to_string(),
            source_version: version.to_string(),
            added: summary.added,
            updated: summary.updated,
            total: summary.total,
            skipped: summary.skipped,
            status: if summary.skipped > 0 { SyncStatus::Partial } else { SyncStatus::Success },
            error_message: None,
            synced_at: now,
        }
    }

    pub fn failure(source_id: &str, version: &str, error: &str, now: i64) -> Self {
        Self {
            id: 0,
            source_id: source_id.to_string(),
            source_version: version.to_string(),
            added: 0,
            updated: 0,
            total: 0,
            skipped: 0,
            status: SyncStatus::Failed,
            error_message: Some(error.to_string()),
            synced_at: now,
        }
    }
}
