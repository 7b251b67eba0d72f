//! CrawlGuard - wires the components over one shared store
//!
//! Holds no logic of its own beyond tier resolution for rate checks.

use std::path::Path;
use std::sync::Arc;

use crate::error::{SyncError, ValidationError};
use crate::logic::catalog_sync::{CatalogSynchronizer, FeedSource, HttpFetcher, PatternFetcher, SyncRecord, SyncSummary};
use crate::logic::detection::{seed_builtin, DetectionPipeline, DetectionResult, HeuristicDetector, KnownPatternDetector, PriorityTier, Signature};
use crate::logic::events::EventSink;
use crate::logic::learning::{AutoLearner, LearnReport, UnknownObservation, UnknownQueue};
use crate::logic::rate_limit::{RateCheck, RateGovernor};
use crate::logic::sessions::{SessionAggregator, Visit, VisitFingerprint};
use crate::logic::tiers::TierRegistry;
use crate::logic::unix_now;
use crate::logic::verification::{DnsResolver, IdentityVerifier, SystemResolver, VerificationResult};
use crate::settings::SharedSettings;
use crate::store::{GuardStore, MemoryStore, SqliteStore, StoreResult};

pub struct CrawlGuard {
    store: Arc<dyn GuardStore>,
    settings: SharedSettings,
    pipeline: DetectionPipeline,
    learner: AutoLearner,
    synchronizer: CatalogSynchronizer,
    verifier: IdentityVerifier,
    sessions: SessionAggregator,
    governor: RateGovernor,
    tiers: TierRegistry,
}

impl CrawlGuard {
    pub fn new<S>(
        store: Arc<S>,
        settings: SharedSettings,
        resolver: Arc<dyn DnsResolver>,
        fetcher: Arc<dyn PatternFetcher>,
        events: Arc<dyn EventSink>,
    ) -> Self
    where
        S: GuardStore + 'static,
    {
        let known = Arc::new(KnownPatternDetector::new(store.clone()));
        let queue = Arc::new(UnknownQueue::new(store.clone(), events.clone()));
        let shared_settings = Arc::new(settings.clone());

        Self {
            pipeline: DetectionPipeline::new(known, HeuristicDetector::new(), queue),
            learner: AutoLearner::new(store.clone(), store.clone(), events.clone()),
            synchronizer: CatalogSynchronizer::new(store.clone(), store.clone(), fetcher, events.clone()),
            verifier: IdentityVerifier::new(shared_settings.clone(), resolver, events.clone()),
            sessions: SessionAggregator::new(store.clone(), store.clone()),
            governor: RateGovernor::new(store.clone(), shared_settings.clone(), events),
            tiers: TierRegistry::new(shared_settings),
            settings,
            store,
        }
    }

    /// SQLite-backed instance with system DNS and HTTP fetching
    pub fn open(path: &Path, settings: SharedSettings, events: Arc<dyn EventSink>) -> StoreResult<Self> {
        let store = Arc::new(SqliteStore::open(path)?);
        log::info!("Opened signature store at {}", path.display());
        Ok(Self::new(
            store,
            settings,
            Arc::new(SystemResolver::from_env()),
            Arc::new(HttpFetcher::from_env()),
            events,
        ))
    }

    /// In-process store; state is lost on drop
    pub fn in_memory(settings: SharedSettings, resolver: Arc<dyn DnsResolver>, events: Arc<dyn EventSink>) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            settings,
            resolver,
            Arc::new(HttpFetcher::from_env()),
            events,
        )
    }

    pub fn seed_builtin_catalog(&self) -> StoreResult<usize> {
        seed_builtin(self.store.as_ref(), unix_now())
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Request path
    // ------------------------------------------------------------------

    pub fn detect(&self, identifier: &str) -> DetectionResult {
        self.pipeline.detect(identifier)
    }

    pub fn verify(&self, identity: &str, origin_address: &str) -> VerificationResult {
        self.verifier.verify(identity, origin_address)
    }

    pub fn record_visit(&self, visit: &Visit) -> StoreResult<VisitFingerprint> {
        self.sessions.record_visit(visit)
    }

    pub fn is_blocked(&self, identity: &str) -> bool {
        self.tiers.is_blocked(identity)
    }

    /// Admin tier for `identity`, else `fallback`, else medium
    pub fn tier_for(&self, identity: &str, fallback: Option<PriorityTier>) -> PriorityTier {
        self.tiers.priority_for(identity, fallback.unwrap_or_default())
    }

    pub fn check_rate(&self, identity: &str, origin_address: &str, tier: Option<PriorityTier>) -> RateCheck {
        self.governor.check(identity, self.tier_for(identity, tier), origin_address)
    }

    pub fn consume_rate(&self, identity: &str, origin_address: &str, tier: Option<PriorityTier>) -> StoreResult<RateCheck> {
        self.governor.consume(identity, self.tier_for(identity, tier), origin_address)
    }

    // ------------------------------------------------------------------
    // Background jobs
    // ------------------------------------------------------------------

    pub fn run_learner(&self) -> StoreResult<LearnReport> {
        self.learner.run()
    }

    pub fn sync_sources(&self, sources: &[FeedSource]) -> Vec<(String, Result<SyncSummary, SyncError>)> {
        self.synchronizer.run_all(sources)
    }

    pub fn sync_url(&self, url: &str, source_id: &str, version: &str) -> Result<SyncSummary, SyncError> {
        self.synchronizer.sync(url, source_id, version)
    }

    pub fn purge_expired_windows(&self) -> StoreResult<usize> {
        self.governor.purge_expired()
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub fn active_signatures(&self) -> StoreResult<Vec<Signature>> {
        self.store.active_signatures()
    }

    pub fn get_signature(&self, id: i64) -> StoreResult<Option<Signature>> {
        self.store.get_signature(id)
    }

    pub fn set_signature_active(&self, id: i64, active: bool) -> StoreResult<()> {
        self.store.set_signature_active(id, active, unix_now())
    }

    pub fn pending_unknown(&self, limit: usize) -> StoreResult<Vec<UnknownObservation>> {
        self.store.pending_observations(0.0, limit)
    }

    pub fn sync_history(&self, source_id: Option<&str>, limit: usize) -> StoreResult<Vec<SyncRecord>> {
        self.store.recent_sync_records(source_id, limit)
    }

    /// Register a CIDR block; cached verdicts are dropped when it is new.
    ///
    /// Only the in-memory settings change. Callers that need the range to
    /// survive a restart write `settings().snapshot()` to their own storage.
    pub fn add_custom_range(&self, identity: &str, cidr: &str) -> Result<bool, ValidationError> {
        let added = self.settings.add_custom_range(identity, cidr)?;
        if added {
            self.verifier.clear_cache();
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::catalog_sync::FeedFormat;
    use crate::logic::detection::DetectionMethod;
    use crate::logic::events::CollectingSink;
    use crate::logic::learning::Sighting;
    use crate::logic::verification::{StaticResolver, VerificationMethod};
    use crate::settings::GuardSettings;
    use crate::store::UnknownRepository;

    struct OneListFetcher(&'static str);

    impl PatternFetcher for OneListFetcher {
        fn fetch(&self, _url: &str) -> Result<String, SyncError> {
            Ok(self.0.to_string())
        }
    }

    fn guard_with_store() -> (CrawlGuard, Arc<MemoryStore>, Arc<CollectingSink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::new());
        let guard = CrawlGuard::new(
            store.clone(),
            SharedSettings::new(GuardSettings::default()),
            Arc::new(StaticResolver::new()),
            Arc::new(OneListFetcher("[\"HarvestBot\", \"LedgerCrawler\"]")),
            sink.clone(),
        );
        guard.seed_builtin_catalog().unwrap();
        (guard, store, sink)
    }

    fn guard() -> (CrawlGuard, Arc<CollectingSink>) {
        let (guard, _, sink) = guard_with_store();
        (guard, sink)
    }

    #[test]
    fn test_builtin_catalog_detects_known_crawlers() {
        let (guard, _) = guard();
        let result = guard.detect("Mozilla/5.0 (compatible; ClaudeBot/1.0; +claudebot@anthropic.com)");
        assert!(result.is_bot());
        assert_eq!(result.method(), DetectionMethod::KnownPattern);
        assert_eq!(result.bot_name(), Some("ClaudeBot"));
    }

    #[test]
    fn test_unknown_crawler_is_queued_then_learned() {
        let (guard, store, sink) = guard_with_store();

        let weak = guard.detect("CustomSpider/1.0");
        assert_eq!(weak.method(), DetectionMethod::Heuristic);
        assert!(weak.needs_review());
        assert_eq!(sink.count("new_unknown_identifier"), 1);
        assert_eq!(guard.pending_unknown(10).unwrap().len(), 1);

        // Below the learning threshold
        assert_eq!(guard.run_learner().unwrap().learned, 0);

        let ua = "Mozilla/5.0 (compatible; OrbitCrawler/3.1)";
        store.upsert_observation(&Sighting::new(ua, Some("OrbitCrawler"), 0.92, unix_now())).unwrap();
        assert_eq!(guard.run_learner().unwrap().learned, 1);

        let again = guard.detect(ua);
        assert_eq!(again.method(), DetectionMethod::KnownPattern);
        assert_eq!(again.bot_name(), Some("OrbitCrawler"));
        assert_eq!(again.confidence(), 0.92);
    }

    #[test]
    fn test_sync_then_detect() {
        let (guard, _) = guard();
        let source = FeedSource {
            id: "local".into(),
            name: "Local".into(),
            url: "https://lists.example/bots.json".into(),
            format: FeedFormat::Json,
            version: "7".into(),
            enabled: true,
        };
        let results = guard.sync_sources(&[source]);
        assert_eq!(results[0].1.as_ref().unwrap().added, 2);
        assert_eq!(guard.detect("HarvestBot").method(), DetectionMethod::KnownPattern);
        assert_eq!(guard.sync_history(Some("local"), 5).unwrap().len(), 1);
    }

    #[test]
    fn test_custom_range_takes_effect_immediately() {
        let (guard, _) = guard();
        assert_eq!(guard.verify("InternalBot", "10.9.8.7").is_verified(), Some(false));
        assert!(guard.add_custom_range("InternalBot", "10.9.0.0/16").unwrap());
        assert!(!guard.add_custom_range("internalbot", "10.9.8.0/16").unwrap());
        assert_eq!(guard.verify("InternalBot", "10.9.8.7").method(), Some(VerificationMethod::IpRange));
    }

    #[test]
    fn test_rate_uses_admin_tier() {
        let (guard, _) = guard();
        // ClaudeBot is high priority by default: never capped
        for _ in 0..200 {
            assert!(guard.consume_rate("ClaudeBot", "3.128.0.1", Some(PriorityTier::Low)).unwrap().allowed);
        }
        for _ in 0..10 {
            assert!(guard.consume_rate("NobodyBot", "10.0.0.1", Some(PriorityTier::Low)).unwrap().allowed);
        }
        assert!(!guard.check_rate("NobodyBot", "10.0.0.1", Some(PriorityTier::Low)).allowed);
    }

    #[test]
    fn test_deactivated_signature_stops_matching() {
        let (guard, _) = guard();
        let sig = guard
            .active_signatures()
            .unwrap()
            .into_iter()
            .find(|s| s.bot_name == "GPTBot")
            .unwrap();
        guard.set_signature_active(sig.id, false).unwrap();
        assert_eq!(guard.detect("GPTBot/1.0").method(), DetectionMethod::Heuristic);
        assert!(!guard.get_signature(sig.id).unwrap().unwrap().is_active);
    }
}
