//! External Catalog Synchronizer
//!
//! Fetch -> parse (fail-closed) -> per-entry validate and upsert -> history.
//! Every run, successful or not, leaves exactly one sync-history record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::parser::{self, derive_name, FeedEntry};
use super::types::{FeedFormat, FeedSource, SyncRecord, SyncSummary};
use crate::constants::{get_fetch_timeout_secs, EXTERNAL_SIGNATURE_CONFIDENCE};
use crate::error::{StoreError, SyncError};
use crate::logic::detection::known_pattern::compile_pattern;
use crate::logic::detection::types::{BotCategory, NewSignature, PriorityTier, SignatureSource};
use crate::logic::events::{EventSink, GuardEvent};
use crate::logic::unix_now;
use crate::store::{SignatureRepository, SyncLogRepository};

// ============================================================================
// FETCHER
// ============================================================================

/// Retrieves a remote signature list body
pub trait PatternFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, SyncError>;
}

/// Blocking HTTP fetcher with a per-request timeout
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("crawlguard/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    pub fn from_env() -> Self {
        Self::new(Duration::from_secs(get_fetch_timeout_secs()))
    }
}

impl PatternFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, SyncError> {
        match self.agent.get(url).call() {
            Ok(resp) if resp.status() == 200 => {
                resp.into_string().map_err(|e| SyncError::Network(e.to_string()))
            }
            Ok(resp) => Err(SyncError::Http(resp.status())),
            Err(ureq::Error::Status(code, _)) => Err(SyncError::Http(code)),
            Err(e) => Err(SyncError::Network(e.to_string())),
        }
    }
}

// ============================================================================
// SYNCHRONIZER
// ============================================================================

pub struct CatalogSynchronizer {
    signatures: Arc<dyn SignatureRepository>,
    history: Arc<dyn SyncLogRepository>,
    fetcher: Arc<dyn PatternFetcher>,
    events: Arc<dyn EventSink>,
    running: AtomicBool,
}

/// Clears the in-progress flag however the run ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CatalogSynchronizer {
    pub fn new(
        signatures: Arc<dyn SignatureRepository>,
        history: Arc<dyn SyncLogRepository>,
        fetcher: Arc<dyn PatternFetcher>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { signatures, history, fetcher, events, running: AtomicBool::new(false) }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sync one list, guessing its format from the payload
    pub fn sync(&self, url: &str, source_id: &str, version: &str) -> Result<SyncSummary, SyncError> {
        self.sync_with_format(url, source_id, version, None)
    }

    pub fn sync_source(&self, source: &FeedSource) -> Result<SyncSummary, SyncError> {
        self.sync_with_format(&source.url, &source.id, &source.version, Some(source.format))
    }

    /// Sync every enabled source; one failing source does not stop the rest
    pub fn run_all(&self, sources: &[FeedSource]) -> Vec<(String, Result<SyncSummary, SyncError>)> {
        sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| {
                let result = self.sync_source(s);
                match &result {
                    Ok(summary) => log::info!(
                        "Synced {}: added={} updated={} skipped={}",
                        s.name,
                        summary.added,
                        summary.updated,
                        summary.skipped
                    ),
                    Err(e) => log::warn!("Failed to sync {}: {}", s.name, e),
                }
                (s.id.clone(), result)
            })
            .collect()
    }

    fn sync_with_format(
        &self,
        url: &str,
        source_id: &str,
        version: &str,
        format: Option<FeedFormat>,
    ) -> Result<SyncSummary, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Sync of {} refused: another sync is in progress", source_id);
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let now = unix_now();
        match self.fetch_and_merge(url, version, format, now) {
            Ok(summary) => {
                self.write_history(&SyncRecord::success(source_id, version, &summary, now));
                self.events.emit(GuardEvent::CatalogSynced {
                    source_id: source_id.to_string(),
                    version: version.to_string(),
                    summary,
                });
                Ok(summary)
            }
            Err(e) => {
                log::error!("Catalog sync {} failed: {}", source_id, e);
                self.write_history(&SyncRecord::failure(source_id, version, &e.to_string(), now));
                self.events.emit(GuardEvent::CatalogSyncFailed {
                    source_id: source_id.to_string(),
                    version: version.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn fetch_and_merge(
        &self,
        url: &str,
        version: &str,
        format: Option<FeedFormat>,
        now: i64,
    ) -> Result<SyncSummary, SyncError> {
        let body = self.fetcher.fetch(url)?;
        let format = format.unwrap_or_else(|| parser::detect_format(&body));
        let feed = parser::parse(&body, format)?;

        let mut summary = SyncSummary { total: feed.entries.len(), skipped: feed.malformed, ..Default::default() };

        for entry in &feed.entries {
            if let Err(e) = compile_pattern(&entry.pattern) {
                log::warn!("Skipping feed entry: {}", e);
                summary.skipped += 1;
                continue;
            }
            match self.upsert_entry(entry, version, now) {
                Ok(true) => summary.added += 1,
                Ok(false) => summary.updated += 1,
                Err(e) => {
                    log::warn!("Failed to upsert pattern {:?}: {}", entry.pattern, e);
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Returns true when a new signature was inserted
    fn upsert_entry(&self, entry: &FeedEntry, version: &str, now: i64) -> Result<bool, StoreError> {
        let name = entry.name.clone().unwrap_or_else(|| derive_name(&entry.pattern));

        if let Some(existing) = self.signatures.find_by_pattern(&entry.pattern)? {
            self.signatures.update_signature_owner(existing.id, &name, Some(version), now)?;
            return Ok(false);
        }

        let new_sig = NewSignature {
            category: BotCategory::Other,
            priority: PriorityTier::Medium,
            confidence: EXTERNAL_SIGNATURE_CONFIDENCE,
            source: SignatureSource::ExternalDb,
            source_version: Some(version.to_string()),
            ..NewSignature::regex(&entry.pattern, &name)
        };

        match self.signatures.insert_signature(&new_sig, now) {
            Ok(_) => Ok(true),
            Err(StoreError::Conflict(_)) => {
                // Inserted concurrently; fall back to the update path
                let existing = self
                    .signatures
                    .find_by_pattern(&entry.pattern)?
                    .ok_or_else(|| StoreError::NotFound(entry.pattern.clone()))?;
                self.signatures.update_signature_owner(existing.id, &name, Some(version), now)?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn write_history(&self, record: &SyncRecord) {
        if let Err(e) = self.history.append_sync_record(record) {
            log::error!("Failed to write sync history for {}: {}", record.source_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::catalog_sync::types::SyncStatus;
    use crate::logic::events::CollectingSink;
    use crate::store::MemoryStore;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Canned responses keyed by URL
    #[derive(Default)]
    struct FakeFetcher {
        responses: Mutex<HashMap<String, Result<String, u16>>>,
    }

    impl FakeFetcher {
        fn serve(&self, url: &str, body: &str) {
            self.responses.lock().insert(url.to_string(), Ok(body.to_string()));
        }

        fn fail(&self, url: &str, status: u16) {
            self.responses.lock().insert(url.to_string(), Err(status));
        }
    }

    impl PatternFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<String, SyncError> {
            match self.responses.lock().get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(SyncError::Http(*status)),
                None => Err(SyncError::Network("connection refused".to_string())),
            }
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        fetcher: Arc<FakeFetcher>,
        sink: Arc<CollectingSink>,
        sync: CatalogSynchronizer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(FakeFetcher::default());
        let sink = Arc::new(CollectingSink::new());
        let sync = CatalogSynchronizer::new(store.clone(), store.clone(), fetcher.clone(), sink.clone());
        Fixture { store, fetcher, sink, sync }
    }

    const PHP_LIST: &str = "<?php\nreturn array(\n    'ClaudeBot' => '/ClaudeBot/i',\n    'GPTBot' => '/GPTBot/i'\n);";

    #[test]
    fn test_sync_adds_then_updates() {
        let f = fixture();
        f.fetcher.serve("https://feed.test/bots.php", PHP_LIST);

        let first = f.sync.sync("https://feed.test/bots.php", "test-feed", "v1").unwrap();
        assert_eq!(first, SyncSummary { added: 2, updated: 0, total: 2, skipped: 0 });

        let sig = f.store.find_by_pattern("/ClaudeBot/i").unwrap().unwrap();
        assert_eq!(sig.source, SignatureSource::ExternalDb);
        assert_eq!(sig.confidence, EXTERNAL_SIGNATURE_CONFIDENCE);
        assert_eq!(sig.source_version.as_deref(), Some("v1"));

        let second = f.sync.sync("https://feed.test/bots.php", "test-feed", "v2").unwrap();
        assert_eq!(second, SyncSummary { added: 0, updated: 2, total: 2, skipped: 0 });
        let sig = f.store.find_by_pattern("/ClaudeBot/i").unwrap().unwrap();
        assert_eq!(sig.source_version.as_deref(), Some("v2"));

        let history = f.store.recent_sync_records(Some("test-feed"), 10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.status == SyncStatus::Success));
        assert_eq!(f.sink.count("catalog_synced"), 2);
    }

    #[test]
    fn test_malformed_payload_changes_nothing() {
        let f = fixture();
        f.fetcher.serve("https://feed.test/broken.php", "<?php return array('GPTBot', 'unterminated");

        let err = f.sync.sync("https://feed.test/broken.php", "broken", "latest").unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
        assert_eq!(f.store.signature_count(), 0);

        let history = f.store.recent_sync_records(Some("broken"), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, SyncStatus::Failed);
        assert!(history[0].error_message.is_some());
        assert_eq!(f.sink.count("catalog_sync_failed"), 1);
    }

    #[test]
    fn test_http_error_is_recorded() {
        let f = fixture();
        f.fetcher.fail("https://feed.test/missing.php", 404);

        let err = f.sync.sync("https://feed.test/missing.php", "missing", "latest").unwrap_err();
        assert!(matches!(err, SyncError::Http(404)));
        let history = f.store.recent_sync_records(None, 10).unwrap();
        assert_eq!(history[0].error_message.as_deref(), Some("HTTP 404 error"));
    }

    #[test]
    fn test_invalid_regex_entries_are_skipped() {
        let f = fixture();
        f.fetcher.serve("https://feed.test/list.json", r#"["GoodBot", "bad(regex", {"pattern": "OtherBot", "name": "Other"}]"#);

        let summary = f.sync.sync("https://feed.test/list.json", "json-feed", "latest").unwrap();
        assert_eq!(summary, SyncSummary { added: 2, updated: 0, total: 3, skipped: 1 });
        assert_eq!(f.store.find_by_pattern("OtherBot").unwrap().unwrap().bot_name, "Other");
        assert_eq!(f.store.find_by_pattern("GoodBot").unwrap().unwrap().bot_name, "GoodBot");

        let history = f.store.recent_sync_records(Some("json-feed"), 1).unwrap();
        assert_eq!(history[0].status, SyncStatus::Partial);
    }

    #[test]
    fn test_existing_builtin_pattern_is_updated_not_duplicated() {
        let f = fixture();
        f.store.insert_signature(&NewSignature::regex("GPTBot", "GPTBot"), 1).unwrap();
        f.fetcher.serve("https://feed.test/lines.txt", "# list\nGPTBot\nNewcomerBot\n");

        let summary = f.sync.sync("https://feed.test/lines.txt", "lines", "latest").unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(f.store.signature_count(), 2);
    }

    #[test]
    fn test_run_all_skips_disabled_and_continues_after_failure() {
        let f = fixture();
        f.fetcher.serve("https://feed.test/ok.php", PHP_LIST);
        let sources = vec![
            FeedSource {
                id: "down".into(),
                name: "Down".into(),
                url: "https://feed.test/down".into(),
                format: FeedFormat::Lines,
                version: "latest".into(),
                enabled: true,
            },
            FeedSource {
                id: "ok".into(),
                name: "Ok".into(),
                url: "https://feed.test/ok.php".into(),
                format: FeedFormat::PhpArray,
                version: "latest".into(),
                enabled: true,
            },
            FeedSource {
                id: "off".into(),
                name: "Off".into(),
                url: "https://feed.test/ok.php".into(),
                format: FeedFormat::PhpArray,
                version: "latest".into(),
                enabled: false,
            },
        ];

        let results = f.sync.run_all(&sources);
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_err());
        assert_eq!(results[1].1.as_ref().unwrap().added, 2);
        assert!(!f.sync.is_running());
    }

    #[test]
    fn test_concurrent_run_is_refused() {
        let f = fixture();
        f.sync.running.store(true, Ordering::Release);
        let err = f.sync.sync("https://feed.test/ok.php", "ok", "latest").unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning));
    }
}
