//! Tier Registry - administrative priority and block list lookup

use std::sync::Arc;

use crate::logic::detection::types::PriorityTier;
use crate::settings::SettingsSource;

pub struct TierRegistry {
    settings: Arc<dyn SettingsSource>,
}

impl TierRegistry {
    pub fn new(settings: Arc<dyn SettingsSource>) -> Self {
        Self { settings }
    }

    /// Admin-assigned tier for `identity`, else `default`
    pub fn priority_for(&self, identity: &str, default: PriorityTier) -> PriorityTier {
        self.settings.snapshot().priority_of(identity).unwrap_or(default)
    }

    pub fn is_blocked(&self, identity: &str) -> bool {
        let settings = self.settings.snapshot();
        settings.is_listed_blocked(identity) || settings.priority_of(identity) == Some(PriorityTier::Blocked)
    }
}
