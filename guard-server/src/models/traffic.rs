//! Visit and rate-limit payloads

use serde::Deserialize;
use validator::Validate;

use crawlguard_core::PriorityTier;

#[derive(Debug, Deserialize, Validate)]
pub struct VisitRequest {
    #[validate(length(min = 1, max = 2048))]
    pub identifier: String,
    #[validate(length(min = 1, max = 64))]
    pub origin_address: String,
    #[validate(length(max = 2048))]
    pub path: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub classification: Option<String>,
    /// Unix seconds; defaults to now
    #[validate(range(min = 0))]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RateRequest {
    #[validate(length(min = 1, max = 128))]
    pub identity: String,
    #[validate(length(min = 1, max = 64))]
    pub origin_address: String,
    /// Used when no tier is assigned to the identity
    pub tier: Option<PriorityTier>,
}
