//! Rate Governor
//!
//! Two independent counters per (identity, origin): a 60s window and a
//! 3600s window. `check` reads only; `increment` spends budget. Windows
//! reset lazily when read after their expiry.

use std::sync::Arc;

use super::types::{LimitWindow, RateCheck, RateWindow};
use crate::logic::detection::types::PriorityTier;
use crate::logic::events::{EventSink, GuardEvent};
use crate::logic::{field_digest, unix_now};
use crate::settings::SettingsSource;
use crate::store::{RateWindowRepository, StoreResult};

const WINDOWS: [LimitWindow; 2] = [LimitWindow::Minute, LimitWindow::Hour];

/// Storage key: digest of (identity, origin) plus the window name
pub fn window_key(identity: &str, origin_address: &str, window: LimitWindow) -> String {
    let identity = identity.to_ascii_lowercase();
    format!("{}:{}", field_digest(&[&identity, origin_address.trim()]), window.as_str())
}

fn with_overall_remaining(mut check: RateCheck) -> RateCheck {
    check.remaining = match (check.minute_remaining, check.hour_remaining) {
        (Some(m), Some(h)) => Some(m.min(h)),
        (m, h) => m.or(h),
    };
    check
}

pub struct RateGovernor {
    windows: Arc<dyn RateWindowRepository>,
    settings: Arc<dyn SettingsSource>,
    events: Arc<dyn EventSink>,
}

impl RateGovernor {
    pub fn new(
        windows: Arc<dyn RateWindowRepository>,
        settings: Arc<dyn SettingsSource>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { windows, settings, events }
    }

    pub fn check(&self, identity: &str, tier: PriorityTier, origin_address: &str) -> RateCheck {
        self.check_at(identity, tier, origin_address, unix_now())
    }

    /// Read-only budget check; never consumes.
    ///
    /// Blocked identities must be rejected before reaching here; a blocked
    /// tier has no caps of its own.
    pub fn check_at(&self, identity: &str, tier: PriorityTier, origin_address: &str, now: i64) -> RateCheck {
        let limits = self.settings.snapshot().limits_for(tier);
        if limits.is_unlimited() {
            return RateCheck::unlimited();
        }

        let mut result = RateCheck::unlimited();
        for window in WINDOWS {
            let cap = limits.cap(window);
            if cap == 0 {
                continue;
            }

            let key = window_key(identity, origin_address, window);
            let stored = match self.windows.current_window(&key, now) {
                Ok(stored) => stored,
                Err(e) => {
                    log::error!("Rate window read failed for {} ({}); allowing", identity, e);
                    return RateCheck::unlimited();
                }
            };

            let count = stored.map(|w| w.count).unwrap_or(0);
            if count >= cap {
                let retry_after = stored.map(|w| (w.reset_at - now).max(1) as u64).unwrap_or(1);
                return self.deny(identity, origin_address, window, retry_after);
            }

            let left = cap - count;
            match window {
                LimitWindow::Minute => result.minute_remaining = Some(left),
                LimitWindow::Hour => result.hour_remaining = Some(left),
            }
        }

        with_overall_remaining(result)
    }

    fn deny(&self, identity: &str, origin_address: &str, window: LimitWindow, retry_after: u64) -> RateCheck {
        log::info!(
            "Rate limit hit: {} from {} ({} window, retry in {}s)",
            identity,
            origin_address,
            window.as_str(),
            retry_after
        );
        self.events.emit(GuardEvent::RateLimited {
            identity: identity.to_string(),
            origin_address: origin_address.to_string(),
            window,
            retry_after,
        });
        RateCheck::denied(window, retry_after)
    }

    pub fn increment(&self, identity: &str, origin_address: &str) -> StoreResult<()> {
        self.increment_at(identity, origin_address, unix_now())
    }

    /// Spend one unit in both windows
    pub fn increment_at(&self, identity: &str, origin_address: &str, now: i64) -> StoreResult<()> {
        for window in WINDOWS {
            self.spend(identity, origin_address, window, now)?;
        }
        Ok(())
    }

    fn spend(&self, identity: &str, origin_address: &str, window: LimitWindow, now: i64) -> StoreResult<RateWindow> {
        let key = window_key(identity, origin_address, window);
        self.windows.increment_window(&key, window.seconds(), now).map_err(|e| {
            log::error!("Rate window increment failed for {}: {}", identity, e);
            e
        })
    }

    /// Spend one unit if the budget allows.
    ///
    /// The decision is taken from the counts the atomic increment returns,
    /// so concurrent callers can never be allowed past a cap. A caller that
    /// loses the race for the last unit is denied; its unit stays spent.
    pub fn consume_at(&self, identity: &str, tier: PriorityTier, origin_address: &str, now: i64) -> StoreResult<RateCheck> {
        let precheck = self.check_at(identity, tier, origin_address, now);
        if !precheck.allowed {
            return Ok(precheck);
        }

        let limits = self.settings.snapshot().limits_for(tier);
        let mut result = RateCheck::unlimited();
        for window in WINDOWS {
            let counted = self.spend(identity, origin_address, window, now)?;
            let cap = limits.cap(window);
            if cap == 0 {
                continue;
            }
            if counted.count > cap {
                let retry_after = (counted.reset_at - now).max(1) as u64;
                return Ok(self.deny(identity, origin_address, window, retry_after));
            }

            let left = cap - counted.count;
            match window {
                LimitWindow::Minute => result.minute_remaining = Some(left),
                LimitWindow::Hour => result.hour_remaining = Some(left),
            }
        }
        Ok(with_overall_remaining(result))
    }

    pub fn consume(&self, identity: &str, tier: PriorityTier, origin_address: &str) -> StoreResult<RateCheck> {
        self.consume_at(identity, tier, origin_address, unix_now())
    }

    /// Housekeeping: drop windows that have already expired
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let purged = self.windows.purge_expired_windows(unix_now())?;
        if purged > 0 {
            log::debug!("Purged {} expired rate windows", purged);
        }
        Ok(purged)
    }
}
