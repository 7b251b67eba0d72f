//! Detection Types
//!
//! Core types for signatures and detection results.
//! No logic here beyond construction and string mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{CONFIDENCE_THRESHOLD, REVIEW_BAND_LOW};

// ============================================================================
// PATTERN TYPE
// ============================================================================

/// How a signature pattern is compared against an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Case-insensitive equality with the whole identifier
    Exact,
    /// Case-insensitive regular expression
    Regex,
    /// Case-insensitive substring
    Contains,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Exact => "exact",
            PatternType::Regex => "regex",
            PatternType::Contains => "contains",
        }
    }

    /// Lower rank = more specific, checked first
    pub fn specificity_rank(&self) -> u8 {
        match self {
            PatternType::Exact => 0,
            PatternType::Contains => 1,
            PatternType::Regex => 2,
        }
    }
}

impl FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(PatternType::Exact),
            "regex" => Ok(PatternType::Regex),
            "contains" => Ok(PatternType::Contains),
            other => Err(format!("unknown pattern type: {}", other)),
        }
    }
}

// ============================================================================
// SIGNATURE SOURCE / CATEGORY / PRIORITY
// ============================================================================

/// Where a signature came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureSource {
    Manual,
    Heuristic,
    ExternalDb,
    AutoLearned,
}

impl SignatureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureSource::Manual => "manual",
            SignatureSource::Heuristic => "heuristic",
            SignatureSource::ExternalDb => "external_db",
            SignatureSource::AutoLearned => "auto_learned",
        }
    }
}

impl FromStr for SignatureSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SignatureSource::Manual),
            "heuristic" => Ok(SignatureSource::Heuristic),
            "external_db" => Ok(SignatureSource::ExternalDb),
            "auto_learned" => Ok(SignatureSource::AutoLearned),
            other => Err(format!("unknown signature source: {}", other)),
        }
    }
}

/// Crawler category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotCategory {
    Ai,
    Search,
    Social,
    Seo,
    Monitoring,
    Other,
    AutoLearned,
}

impl BotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotCategory::Ai => "ai",
            BotCategory::Search => "search",
            BotCategory::Social => "social",
            BotCategory::Seo => "seo",
            BotCategory::Monitoring => "monitoring",
            BotCategory::Other => "other",
            BotCategory::AutoLearned => "auto_learned",
        }
    }
}

impl FromStr for BotCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(BotCategory::Ai),
            "search" => Ok(BotCategory::Search),
            "social" => Ok(BotCategory::Social),
            "seo" => Ok(BotCategory::Seo),
            "monitoring" => Ok(BotCategory::Monitoring),
            "other" => Ok(BotCategory::Other),
            "auto_learned" => Ok(BotCategory::AutoLearned),
            other => Err(format!("unknown bot category: {}", other)),
        }
    }
}

/// Administrative importance tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
    Blocked,
}

impl PriorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::High => "high",
            PriorityTier::Medium => "medium",
            PriorityTier::Low => "low",
            PriorityTier::Blocked => "blocked",
        }
    }

    /// Ordering used when several signatures could match
    pub fn rank(&self) -> u8 {
        match self {
            PriorityTier::High => 0,
            PriorityTier::Medium => 1,
            PriorityTier::Low => 2,
            PriorityTier::Blocked => 3,
        }
    }
}

impl Default for PriorityTier {
    fn default() -> Self {
        PriorityTier::Medium
    }
}

impl FromStr for PriorityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(PriorityTier::High),
            "medium" => Ok(PriorityTier::Medium),
            "low" => Ok(PriorityTier::Low),
            "blocked" => Ok(PriorityTier::Blocked),
            other => Err(format!("unknown priority tier: {}", other)),
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SIGNATURE
// ============================================================================

/// A catalog rule mapping an identifier pattern to a named crawler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: i64,
    pub pattern: String,
    pub pattern_type: PatternType,
    pub bot_name: String,
    pub bot_vendor: Option<String>,
    pub category: BotCategory,
    pub priority: PriorityTier,
    pub confidence: f64,
    pub is_active: bool,
    pub visit_count: u64,
    pub last_seen: Option<i64>,
    pub source: SignatureSource,
    pub source_version: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert payload for a signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSignature {
    pub pattern: String,
    pub pattern_type: PatternType,
    pub bot_name: String,
    pub bot_vendor: Option<String>,
    pub category: BotCategory,
    pub priority: PriorityTier,
    pub confidence: f64,
    pub source: SignatureSource,
    pub source_version: Option<String>,
}

impl NewSignature {
    /// Case-insensitive regex signature with manual defaults
    pub fn regex(pattern: &str, bot_name: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            pattern_type: PatternType::Regex,
            bot_name: bot_name.to_string(),
            bot_vendor: None,
            category: BotCategory::Other,
            priority: PriorityTier::Medium,
            confidence: 1.0,
            source: SignatureSource::Manual,
            source_version: None,
        }
    }

    pub fn into_signature(self, id: i64, now: i64) -> Signature {
        Signature {
            id,
            pattern: self.pattern,
            pattern_type: self.pattern_type,
            bot_name: self.bot_name,
            bot_vendor: self.bot_vendor,
            category: self.category,
            priority: self.priority,
            confidence: self.confidence.clamp(0.0, 1.0),
            is_active: true,
            visit_count: 0,
            last_seen: None,
            source: self.source,
            source_version: self.source_version,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// DETECTION RESULT
// ============================================================================

/// Which detector produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    KnownPattern,
    Heuristic,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::KnownPattern => "known_pattern",
            DetectionMethod::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable classification of one identifier.
///
/// Built once through the constructors below and never mutated afterwards;
/// `is_confident()` is derived from `confidence` so the two cannot disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    is_bot: bool,
    confidence: f64,
    bot_name: Option<String>,
    bot_vendor: Option<String>,
    bot_category: Option<BotCategory>,
    method: DetectionMethod,
    indicators: Vec<String>,
    needs_review: bool,
}

impl DetectionResult {
    /// A catalog hit
    pub fn from_signature(signature: &Signature) -> Self {
        Self {
            is_bot: true,
            confidence: signature.confidence.clamp(0.0, 1.0),
            bot_name: Some(signature.bot_name.clone()),
            bot_vendor: signature.bot_vendor.clone(),
            bot_category: Some(signature.category),
            method: DetectionMethod::KnownPattern,
            indicators: vec![
                format!("matched_pattern:{}", signature.pattern),
                format!("pattern_type:{}", signature.pattern_type.as_str()),
            ],
            needs_review: false,
        }
    }

    /// Nothing matched
    pub fn no_match(method: DetectionMethod) -> Self {
        Self {
            is_bot: false,
            confidence: 0.0,
            bot_name: None,
            bot_vendor: None,
            bot_category: None,
            method,
            indicators: Vec::new(),
            needs_review: false,
        }
    }

    /// A scored heuristic outcome; review flag and bot flag follow the score
    pub fn heuristic(
        confidence: f64,
        bot_threshold: f64,
        bot_name: Option<String>,
        indicators: Vec<String>,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            is_bot: confidence >= bot_threshold,
            confidence,
            bot_name,
            bot_vendor: None,
            bot_category: None,
            method: DetectionMethod::Heuristic,
            indicators,
            needs_review: (REVIEW_BAND_LOW..CONFIDENCE_THRESHOLD).contains(&confidence),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.is_bot
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn is_confident(&self) -> bool {
        self.confidence >= CONFIDENCE_THRESHOLD
    }

    pub fn bot_name(&self) -> Option<&str> {
        self.bot_name.as_deref()
    }

    pub fn bot_vendor(&self) -> Option<&str> {
        self.bot_vendor.as_deref()
    }

    pub fn bot_category(&self) -> Option<BotCategory> {
        self.bot_category
    }

    pub fn method(&self) -> DetectionMethod {
        self.method
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn needs_review(&self) -> bool {
        self.needs_review
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_invariant_at_boundaries() {
        for c in [0.0, 0.39, 0.4, 0.69, 0.7, 0.71, 1.0] {
            let r = DetectionResult::heuristic(c, 0.5, None, vec![]);
            assert_eq!(r.is_confident(), r.confidence() >= 0.7);
        }
    }

    #[test]
    fn test_review_band() {
        assert!(!DetectionResult::heuristic(0.39, 0.5, None, vec![]).needs_review());
        assert!(DetectionResult::heuristic(0.4, 0.5, None, vec![]).needs_review());
        assert!(DetectionResult::heuristic(0.69, 0.5, None, vec![]).needs_review());
        assert!(!DetectionResult::heuristic(0.7, 0.5, None, vec![]).needs_review());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let r = DetectionResult::heuristic(1.7, 0.5, None, vec![]);
        assert_eq!(r.confidence(), 1.0);
        assert!(r.is_bot());
    }

    #[test]
    fn test_enum_string_mapping() {
        assert_eq!("external_db".parse::<SignatureSource>(), Ok(SignatureSource::ExternalDb));
        assert_eq!("HIGH".parse::<PriorityTier>(), Ok(PriorityTier::High));
        assert!("ml".parse::<PatternType>().is_err());
        assert_eq!(BotCategory::AutoLearned.as_str(), "auto_learned");
    }
}
