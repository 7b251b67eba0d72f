//! Auto-Learner - promotes high-confidence unknown identifiers to signatures
//!
//! Name and pattern derivation are pure functions of the identifier, so
//! replaying an observation always yields the same pattern and therefore
//! a `duplicate_pattern` outcome instead of a second signature.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::types::{ObservationStatus, UnknownObservation};
use crate::constants::{LEARN_BATCH_SIZE, LEARN_CONFIDENCE_THRESHOLD, MIN_LEARNED_NAME_LEN};
use crate::error::StoreError;
use crate::logic::detection::types::{BotCategory, NewSignature, PriorityTier, SignatureSource};
use crate::logic::events::{EventSink, GuardEvent};
use crate::logic::unix_now;
use crate::store::{SignatureRepository, UnknownRepository};

static SUFFIXED_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9_-]+(?:Bot|Crawler|Spider|bot|crawler|spider))/[\d.]+").expect("static regex")
});

static COMPATIBLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"compatible;\s*([A-Za-z0-9_-]+)/").expect("static regex"));

static SLASH_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-z0-9_-]+)/").expect("static regex"));

/// Browser tokens that would match nearly every identifier
const GENERIC_TOKENS: [&str; 2] = ["mozilla", "compatible"];

// ============================================================================
// NAME / PATTERN DERIVATION
// ============================================================================

/// Candidate bot name for an identifier
pub fn extract_bot_name(identifier: &str) -> String {
    for re in [&*SUFFIXED_NAME_RE, &*COMPATIBLE_NAME_RE, &*SLASH_NAME_RE] {
        if let Some(m) = re.captures(identifier).and_then(|c| c.get(1)) {
            return m.as_str().to_string();
        }
    }
    identifier
        .split_whitespace()
        .next()
        .map(|first| first.chars().filter(|c| !c.is_control()).collect())
        .unwrap_or_default()
}

/// Case-insensitive literal pattern for a bot name
pub fn generate_pattern(bot_name: &str) -> String {
    format!("(?i){}", regex::escape(bot_name))
}

/// Why a derived name is unusable
pub fn reject_reason(name: &str) -> Option<&'static str> {
    if name.chars().count() < MIN_LEARNED_NAME_LEN {
        return Some("name too short");
    }
    if GENERIC_TOKENS.iter().any(|t| name.eq_ignore_ascii_case(t)) {
        return Some("generic browser token");
    }
    None
}

// ============================================================================
// LEARNER
// ============================================================================

/// Per-run counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LearnReport {
    pub examined: usize,
    pub learned: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed: usize,
}

enum Outcome {
    Learned,
    Duplicate,
    Rejected,
}

pub struct AutoLearner {
    signatures: Arc<dyn SignatureRepository>,
    queue: Arc<dyn UnknownRepository>,
    events: Arc<dyn EventSink>,
    min_confidence: f64,
    batch_size: usize,
}

impl AutoLearner {
    pub fn new(
        signatures: Arc<dyn SignatureRepository>,
        queue: Arc<dyn UnknownRepository>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            signatures,
            queue,
            events,
            min_confidence: LEARN_CONFIDENCE_THRESHOLD,
            batch_size: LEARN_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn run(&self) -> Result<LearnReport, StoreError> {
        self.run_at(unix_now())
    }

    /// Process one batch. Only the initial queue read can fail the run.
    pub fn run_at(&self, now: i64) -> Result<LearnReport, StoreError> {
        let batch = self.queue.pending_observations(self.min_confidence, self.batch_size)?;
        let mut report = LearnReport { examined: batch.len(), ..Default::default() };

        if batch.is_empty() {
            log::debug!("No high-confidence unknown identifiers to learn");
            return Ok(report);
        }

        for obs in &batch {
            match self.learn_one(obs, now) {
                Ok(Outcome::Learned) => report.learned += 1,
                Ok(Outcome::Duplicate) => report.duplicates += 1,
                Ok(Outcome::Rejected) => report.rejected += 1,
                Err(e) => {
                    log::error!("Auto-learn failed for observation {}: {}", obs.id, e);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Auto-learning complete: examined={} learned={} duplicates={} rejected={} failed={}",
            report.examined,
            report.learned,
            report.duplicates,
            report.rejected,
            report.failed
        );
        Ok(report)
    }

    fn learn_one(&self, obs: &UnknownObservation, now: i64) -> Result<Outcome, StoreError> {
        let name = extract_bot_name(&obs.identifier);
        if let Some(reason) = reject_reason(&name) {
            log::info!("Not learning {:?} from observation {}: {}", name, obs.id, reason);
            self.queue.set_observation_status(obs.id, ObservationStatus::Rejected, now)?;
            return Ok(Outcome::Rejected);
        }

        let pattern = generate_pattern(&name);

        // Any owner counts, including deactivated signatures
        if self.signatures.find_by_pattern(&pattern)?.is_some() {
            log::debug!("Pattern {} already owned, marking observation {} duplicate", pattern, obs.id);
            self.queue.set_observation_status(obs.id, ObservationStatus::DuplicatePattern, now)?;
            return Ok(Outcome::Duplicate);
        }

        let new_sig = NewSignature {
            category: BotCategory::AutoLearned,
            priority: PriorityTier::Low,
            confidence: obs.confidence,
            source: SignatureSource::AutoLearned,
            ..NewSignature::regex(&pattern, &name)
        };

        let signature = match self.signatures.insert_signature(&new_sig, now) {
            Ok(sig) => sig,
            Err(StoreError::Conflict(_)) => {
                // Another learner won the race for this pattern
                self.queue.set_observation_status(obs.id, ObservationStatus::DuplicatePattern, now)?;
                return Ok(Outcome::Duplicate);
            }
            Err(e) => return Err(e),
        };

        self.queue.set_observation_status(obs.id, ObservationStatus::AutoClassified, now)?;
        log::info!(
            "Signature learned: {} ({}) confidence={:.2}",
            signature.bot_name,
            signature.pattern,
            signature.confidence
        );
        self.events.emit(GuardEvent::SignatureLearned {
            signature_id: signature.id,
            bot_name: signature.bot_name,
            pattern: signature.pattern,
            confidence: signature.confidence,
        });
        Ok(Outcome::Learned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::detection::known_pattern::KnownPatternDetector;
    use crate::logic::events::CollectingSink;
    use crate::logic::learning::types::{identifier_hash, Sighting};
    use crate::store::MemoryStore;

    fn learner(store: &Arc<MemoryStore>, sink: &Arc<CollectingSink>) -> AutoLearner {
        AutoLearner::new(store.clone(), store.clone(), sink.clone())
    }

    fn queue(store: &MemoryStore, identifier: &str, confidence: f64) {
        store.upsert_observation(&Sighting::new(identifier, None, confidence, 10)).unwrap();
    }

    #[test]
    fn test_extract_bot_name_rules() {
        assert_eq!(extract_bot_name("Mozilla/5.0 (compatible; NovaCrawler/2.1)"), "NovaCrawler");
        assert_eq!(extract_bot_name("Mozilla/5.0 (compatible; Nova/2.1)"), "Nova");
        assert_eq!(extract_bot_name("fetcher-x/3 (+https://x.example)"), "fetcher-x");
        assert_eq!(extract_bot_name("LonelyAgent"), "LonelyAgent");
        assert_eq!(extract_bot_name(""), "");
    }

    #[test]
    fn test_generate_pattern_escapes() {
        assert_eq!(generate_pattern("NovaBot"), "(?i)NovaBot");
        let p = generate_pattern("a.b+c");
        assert!(Regex::new(&p).unwrap().is_match("A.B+C"));
        assert!(!Regex::new(&p).unwrap().is_match("aXb+c"));
    }

    #[test]
    fn test_reject_reason() {
        assert!(reject_reason("ab").is_some());
        assert!(reject_reason("Mozilla").is_some());
        assert!(reject_reason("COMPATIBLE").is_some());
        assert!(reject_reason("NovaBot").is_none());
    }

    #[test]
    fn test_learns_high_confidence_observation() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::new());
        let ua = "NovaBot/1.0 (+https://nova.example/bot)";
        queue(&store, ua, 0.95);
        queue(&store, "LowBot/1.0", 0.6);

        let report = learner(&store, &sink).run_at(100).unwrap();
        assert_eq!(report, LearnReport { examined: 1, learned: 1, ..Default::default() });

        let sig = store.find_by_pattern("(?i)NovaBot").unwrap().unwrap();
        assert_eq!(sig.bot_name, "NovaBot");
        assert_eq!(sig.category, BotCategory::AutoLearned);
        assert_eq!(sig.source, SignatureSource::AutoLearned);
        assert_eq!(sig.priority, PriorityTier::Low);
        assert_eq!(sig.confidence, 0.95);

        let obs = store.find_observation(&identifier_hash(ua)).unwrap().unwrap();
        assert_eq!(obs.status, ObservationStatus::AutoClassified);
        assert_eq!(sink.count("signature_learned"), 1);
    }

    #[test]
    fn test_replay_marks_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::new());
        queue(&store, "NovaBot/1.0", 0.9);
        learner(&store, &sink).run_at(100).unwrap();

        // Same bot, different version string: new observation, same pattern
        queue(&store, "NovaBot/2.0", 0.9);
        let report = learner(&store, &sink).run_at(200).unwrap();
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.learned, 0);
        assert_eq!(store.signature_count(), 1);

        let obs = store.find_observation(&identifier_hash("NovaBot/2.0")).unwrap().unwrap();
        assert_eq!(obs.status, ObservationStatus::DuplicatePattern);
    }

    #[test]
    fn test_deactivated_signature_is_not_resurrected() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::new());
        let sig = store.insert_signature(&NewSignature::regex("(?i)NovaBot", "NovaBot"), 1).unwrap();
        store.set_signature_active(sig.id, false, 2).unwrap();

        queue(&store, "NovaBot/1.0", 0.9);
        let report = learner(&store, &sink).run_at(100).unwrap();
        assert_eq!(report.duplicates, 1);
        assert!(!store.find_by_pattern("(?i)NovaBot").unwrap().unwrap().is_active);
    }

    #[test]
    fn test_generic_name_is_rejected_for_good() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::new());
        let ua = "Mozilla/5.0 (Windows NT 10.0)";
        queue(&store, ua, 0.9);

        let report = learner(&store, &sink).run_at(100).unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(store.signature_count(), 0);
        let obs = store.find_observation(&identifier_hash(ua)).unwrap().unwrap();
        assert_eq!(obs.status, ObservationStatus::Rejected);

        let again = learner(&store, &sink).run_at(200).unwrap();
        assert_eq!(again.examined, 0);
    }

    #[test]
    fn test_rejected_rows_do_not_starve_smaller_batches() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::new());
        queue(&store, "Mozilla/5.0 (Windows NT 10.0)", 0.99);
        queue(&store, "ab/1.0", 0.98);
        queue(&store, "NovaBot/1.0", 0.90);

        let learner = learner(&store, &sink).with_batch_size(1);
        let learned: usize = (0..3).map(|i| learner.run_at(100 + i).unwrap().learned).sum();
        assert_eq!(learned, 1);
        assert!(store.find_by_pattern("(?i)NovaBot").unwrap().is_some());
        assert_eq!(learner.run_at(200).unwrap().examined, 0);
    }

    #[test]
    fn test_batch_size_caps_run() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::new());
        for i in 0..5 {
            queue(&store, &format!("Bot{}Crawler/1.0", i), 0.9);
        }
        let report = learner(&store, &sink).with_batch_size(3).run_at(100).unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.learned, 3);
    }

    #[test]
    fn test_learned_signature_is_detected_with_same_name() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::new());
        queue(&store, "Mozilla/5.0 (compatible; QuasarSpider/4.2)", 0.92);
        learner(&store, &sink).run_at(100).unwrap();

        let detector = KnownPatternDetector::new(store.clone());
        let r = detector.detect("quasarspider/5.0");
        assert!(r.is_bot());
        assert_eq!(r.bot_name(), Some("QuasarSpider"));
        assert_eq!(r.confidence(), 0.92);
    }
}
