//! Rate limiting types

use serde::{Deserialize, Serialize};

use crate::constants::{HOUR_WINDOW_SECS, MINUTE_WINDOW_SECS};

// ============================================================================
// WINDOWS
// ============================================================================

/// Counter window sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitWindow {
    Minute,
    Hour,
}

impl LimitWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitWindow::Minute => "minute",
            LimitWindow::Hour => "hour",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            LimitWindow::Minute => MINUTE_WINDOW_SECS,
            LimitWindow::Hour => HOUR_WINDOW_SECS,
        }
    }
}

/// Stored counter for one (identity, origin, window) key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub count: u32,
    /// Unix time at which the window expires and the count resets
    pub reset_at: i64,
}

impl RateWindow {
    pub fn fresh(window_secs: i64, now: i64) -> Self {
        Self { count: 1, reset_at: now + window_secs }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.reset_at
    }
}

// ============================================================================
// LIMITS
// ============================================================================

/// Caps for one priority tier; zero means no cap for that window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub per_minute: u32,
    pub per_hour: u32,
}

impl TierLimits {
    pub const fn new(per_minute: u32, per_hour: u32) -> Self {
        Self { per_minute, per_hour }
    }

    pub fn is_unlimited(&self) -> bool {
        self.per_minute == 0 && self.per_hour == 0
    }

    pub fn cap(&self, window: LimitWindow) -> u32 {
        match window {
            LimitWindow::Minute => self.per_minute,
            LimitWindow::Hour => self.per_hour,
        }
    }
}

// ============================================================================
// CHECK RESULT
// ============================================================================

/// Outcome of a rate check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCheck {
    pub allowed: bool,
    pub limit_type: Option<LimitWindow>,
    /// Seconds until the denying counter resets (0 when allowed)
    pub retry_after: u64,
    /// Smallest remaining budget across capped windows; None = unlimited
    pub remaining: Option<u32>,
    pub minute_remaining: Option<u32>,
    pub hour_remaining: Option<u32>,
}

impl RateCheck {
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            limit_type: None,
            retry_after: 0,
            remaining: None,
            minute_remaining: None,
            hour_remaining: None,
        }
    }

    pub fn denied(window: LimitWindow, retry_after: u64) -> Self {
        Self {
            allowed: false,
            limit_type: Some(window),
            retry_after,
            remaining: Some(0),
            minute_remaining: None,
            hour_remaining: None,
        }
    }
}
