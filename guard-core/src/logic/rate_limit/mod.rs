//! Rate Limit Module - per-tier, per-origin request budgets

pub mod governor;
pub mod types;

pub use governor::{window_key, RateGovernor};
pub use types::{LimitWindow, RateCheck, RateWindow, TierLimits};
