//! Detection and verification payloads

use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct DetectRequest {
    #[validate(length(max = 2048))]
    pub identifier: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(length(min = 1, max = 128))]
    pub identity: String,
    /// Not format-checked here: a malformed address yields `verified: null`
    #[validate(length(max = 64))]
    pub origin_address: String,
}
