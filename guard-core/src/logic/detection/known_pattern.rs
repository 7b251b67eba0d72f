//! Known-Pattern Detector - catalog lookup (fast path)
//!
//! Reads the active signatures through the repository on every call, so
//! signatures written by the learner or the synchronizer are visible to the
//! next detection without any reload step.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};

use super::types::{DetectionMethod, DetectionResult, PatternType, Signature};
use crate::constants::REGEX_CACHE_MAX_SIZE;
use crate::error::ValidationError;
use crate::logic::unix_now;
use crate::store::SignatureRepository;

/// Compiled size cap for a single signature regex
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Flags accepted in the legacy `/body/flags` form
const LEGACY_FLAGS: &str = "imsuxU";

pub struct KnownPatternDetector {
    signatures: Arc<dyn SignatureRepository>,
    /// pattern -> compiled regex; `None` marks a pattern that failed to compile
    regex_cache: RwLock<HashMap<String, Option<Regex>>>,
}

impl KnownPatternDetector {
    pub fn new(signatures: Arc<dyn SignatureRepository>) -> Self {
        Self { signatures, regex_cache: RwLock::new(HashMap::new()) }
    }

    pub fn detect(&self, identifier: &str) -> DetectionResult {
        if identifier.is_empty() {
            return DetectionResult::no_match(DetectionMethod::KnownPattern);
        }

        let mut signatures = match self.signatures.active_signatures() {
            Ok(sigs) => sigs,
            Err(e) => {
                log::error!("Failed to load signatures: {}", e);
                return DetectionResult::no_match(DetectionMethod::KnownPattern);
            }
        };
        sort_by_specificity(&mut signatures);

        let lowered = identifier.to_lowercase();
        let matched = signatures.iter().find(|sig| self.matches(sig, identifier, &lowered));

        match matched {
            Some(sig) => {
                if let Err(e) = self.signatures.record_signature_hit(sig.id, unix_now()) {
                    log::warn!("Failed to record hit for signature {}: {}", sig.id, e);
                }
                DetectionResult::from_signature(sig)
            }
            None => DetectionResult::no_match(DetectionMethod::KnownPattern),
        }
    }

    fn matches(&self, sig: &Signature, identifier: &str, lowered: &str) -> bool {
        match sig.pattern_type {
            PatternType::Exact => lowered == sig.pattern.to_lowercase(),
            PatternType::Contains => lowered.contains(&sig.pattern.to_lowercase()),
            PatternType::Regex => self
                .compiled(&sig.pattern)
                .map(|re| re.is_match(identifier))
                .unwrap_or(false),
        }
    }

    /// Cached compile; invalid patterns are logged on first sight only
    fn compiled(&self, pattern: &str) -> Option<Regex> {
        if let Some(entry) = self.regex_cache.read().get(pattern) {
            return entry.clone();
        }

        let compiled = match compile_pattern(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("Skipping signature: {}", e);
                None
            }
        };

        let mut cache = self.regex_cache.write();
        if cache.len() >= REGEX_CACHE_MAX_SIZE {
            cache.clear();
        }
        cache.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    pub fn cached_regex_count(&self) -> usize {
        self.regex_cache.read().len()
    }
}

/// Tier first, then exact -> contains -> regex, then longer patterns, then oldest
pub fn sort_by_specificity(signatures: &mut [Signature]) {
    signatures.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then(a.pattern_type.specificity_rank().cmp(&b.pattern_type.specificity_rank()))
            .then(b.pattern.len().cmp(&a.pattern.len()))
            .then(a.id.cmp(&b.id))
    });
}

/// Rewrite the legacy `/body/flags` form as `(?flags)body`
pub fn normalize_pattern(pattern: &str) -> String {
    if let Some(rest) = pattern.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let (body, flags) = (&rest[..end], &rest[end + 1..]);
            if !body.is_empty() && flags.chars().all(|c| LEGACY_FLAGS.contains(c)) {
                let body = body.replace("\\/", "/");
                return if flags.is_empty() { body } else { format!("(?{}){}", flags, body) };
            }
        }
    }
    pattern.to_string()
}

/// Compile a signature pattern (case-insensitive)
pub fn compile_pattern(pattern: &str) -> Result<Regex, ValidationError> {
    if pattern.trim().is_empty() {
        return Err(ValidationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "empty pattern".to_string(),
        });
    }
    RegexBuilder::new(&normalize_pattern(pattern))
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| ValidationError::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() })
}
