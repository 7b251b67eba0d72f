//! Administrative settings
//!
//! Components never cache settings: they ask their `SettingsSource` for a
//! snapshot on every call, so admin changes take effect on the next request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::logic::detection::types::PriorityTier;
use crate::logic::rate_limit::types::TierLimits;
use crate::logic::verification::ranges::Cidr;

// ============================================================================
// SETTINGS
// ============================================================================

/// Default caps per tier (per minute / per hour, 0 = uncapped)
pub fn default_tier_limits(tier: PriorityTier) -> TierLimits {
    match tier {
        PriorityTier::High => TierLimits::new(0, 0),
        PriorityTier::Medium => TierLimits::new(60, 1000),
        PriorityTier::Low => TierLimits::new(10, 100),
        PriorityTier::Blocked => TierLimits::new(0, 0),
    }
}

/// Tiers assigned to well-known crawlers out of the box
fn default_bot_priorities() -> HashMap<String, PriorityTier> {
    [
        ("ClaudeBot", PriorityTier::High),
        ("anthropic-ai", PriorityTier::High),
        ("GPTBot", PriorityTier::High),
        ("ChatGPT-User", PriorityTier::High),
        ("PerplexityBot", PriorityTier::High),
        ("Bytespider", PriorityTier::Medium),
        ("cohere-ai", PriorityTier::Medium),
        ("Google-Extended", PriorityTier::Medium),
        ("FacebookBot", PriorityTier::Medium),
        ("Applebot-Extended", PriorityTier::Medium),
    ]
    .into_iter()
    .map(|(name, tier)| (name.to_string(), tier))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Master switch for identity verification
    pub verification_enabled: bool,
    /// identity -> extra CIDR blocks
    pub custom_ranges: HashMap<String, Vec<String>>,
    /// identity -> extra reverse-DNS hostname suffixes
    pub custom_hostname_suffixes: HashMap<String, Vec<String>>,
    /// Per-tier overrides; missing tiers use `default_tier_limits`
    pub tier_limits: HashMap<PriorityTier, TierLimits>,
    /// identity -> tier
    pub bot_priorities: HashMap<String, PriorityTier>,
    pub blocked_identities: Vec<String>,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            verification_enabled: true,
            custom_ranges: HashMap::new(),
            custom_hostname_suffixes: HashMap::new(),
            tier_limits: HashMap::new(),
            bot_priorities: default_bot_priorities(),
            blocked_identities: Vec::new(),
        }
    }
}

impl GuardSettings {
    pub fn limits_for(&self, tier: PriorityTier) -> TierLimits {
        self.tier_limits.get(&tier).copied().unwrap_or_else(|| default_tier_limits(tier))
    }

    /// Admin-added ranges for `identity` (case-insensitive)
    pub fn ranges_for(&self, identity: &str) -> Vec<&str> {
        lookup_ci(&self.custom_ranges, identity)
    }

    pub fn hostname_suffixes_for(&self, identity: &str) -> Vec<&str> {
        lookup_ci(&self.custom_hostname_suffixes, identity)
    }

    pub fn priority_of(&self, identity: &str) -> Option<PriorityTier> {
        self.bot_priorities
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(identity))
            .map(|(_, tier)| *tier)
    }

    pub fn is_listed_blocked(&self, identity: &str) -> bool {
        self.blocked_identities.iter().any(|b| b.eq_ignore_ascii_case(identity))
    }
}

fn lookup_ci<'a>(map: &'a HashMap<String, Vec<String>>, identity: &str) -> Vec<&'a str> {
    map.iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(identity))
        .flat_map(|(_, values)| values.iter().map(|v| v.as_str()))
        .collect()
}

// ============================================================================
// SOURCES
// ============================================================================

/// Read-at-call-time access to the current settings
pub trait SettingsSource: Send + Sync {
    fn snapshot(&self) -> Arc<GuardSettings>;
}

impl SettingsSource for GuardSettings {
    fn snapshot(&self) -> Arc<GuardSettings> {
        Arc::new(self.clone())
    }
}

/// Mutable settings shared between the admin API and the components
#[derive(Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Arc<GuardSettings>>>,
}

impl SharedSettings {
    pub fn new(settings: GuardSettings) -> Self {
        Self { inner: Arc::new(RwLock::new(Arc::new(settings))) }
    }

    /// Copy-on-write update; readers holding an old snapshot are unaffected
    pub fn update<F: FnOnce(&mut GuardSettings)>(&self, f: F) {
        let mut guard = self.inner.write();
        let mut next = GuardSettings::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Register an extra CIDR block for `identity`.
    ///
    /// Returns `Ok(false)` when the block is already present. The change is
    /// in memory only and is not written anywhere.
    pub fn add_custom_range(&self, identity: &str, cidr: &str) -> Result<bool, ValidationError> {
        let parsed = Cidr::parse(cidr)?;
        let canonical = parsed.to_string();
        let key = identity.trim().to_string();
        if key.is_empty() {
            return Err(ValidationError::InvalidCidr(format!("empty identity for {}", cidr)));
        }

        let mut added = false;
        self.update(|settings| {
            let existing_key = settings
                .custom_ranges
                .keys()
                .find(|k| k.eq_ignore_ascii_case(&key))
                .cloned()
                .unwrap_or_else(|| key.clone());
            let ranges = settings.custom_ranges.entry(existing_key).or_default();
            let present = ranges
                .iter()
                .any(|r| Cidr::parse(r).map(|c| c == parsed).unwrap_or(false));
            if !present {
                ranges.push(canonical.clone());
                added = true;
            }
        });

        if added {
            log::info!("Custom range {} added for {}", canonical, key);
        }
        Ok(added)
    }
}

impl SettingsSource for SharedSettings {
    fn snapshot(&self) -> Arc<GuardSettings> {
        Arc::clone(&self.inner.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = GuardSettings::default();
        assert!(s.verification_enabled);
        assert_eq!(s.limits_for(PriorityTier::Medium), TierLimits::new(60, 1000));
        assert_eq!(s.limits_for(PriorityTier::Low), TierLimits::new(10, 100));
        assert!(s.limits_for(PriorityTier::High).is_unlimited());
        assert_eq!(s.priority_of("gptbot"), Some(PriorityTier::High));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: GuardSettings = serde_json::from_str(
            r#"{"verification_enabled": false, "tier_limits": {"low": {"per_minute": 5, "per_hour": 50}}}"#,
        )
        .unwrap();
        assert!(!s.verification_enabled);
        assert_eq!(s.limits_for(PriorityTier::Low), TierLimits::new(5, 50));
        assert_eq!(s.limits_for(PriorityTier::Medium), TierLimits::new(60, 1000));
        assert!(!s.bot_priorities.is_empty());
    }

    #[test]
    fn test_add_custom_range_is_idempotent() {
        let shared = SharedSettings::default();
        assert_eq!(shared.add_custom_range("NewBot", "203.0.113.0/24"), Ok(true));
        assert_eq!(shared.add_custom_range("newbot", "203.0.113.0/24"), Ok(false));
        assert_eq!(shared.snapshot().ranges_for("NEWBOT"), vec!["203.0.113.0/24"]);

        assert!(shared.add_custom_range("NewBot", "203.0.113.0/33").is_err());
        assert!(shared.add_custom_range("NewBot", "not-a-cidr").is_err());
    }

    #[test]
    fn test_snapshot_is_stable_across_updates() {
        let shared = SharedSettings::default();
        let before = shared.snapshot();
        shared.update(|s| s.verification_enabled = false);
        assert!(before.verification_enabled);
        assert!(!shared.snapshot().verification_enabled);
    }
}
