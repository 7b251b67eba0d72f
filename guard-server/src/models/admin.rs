//! Administrative payloads

use serde::{Deserialize, Serialize};
use validator::Validate;

use crawlguard_core::SyncSummary;

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(length(min = 1, max = 128))]
    pub source: Option<String>,
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LimitQuery {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddRangeRequest {
    #[validate(length(min = 1, max = 128))]
    pub identity: String,
    #[validate(length(min = 1, max = 64))]
    pub cidr: String,
}

#[derive(Debug, Serialize)]
pub struct AddRangeResponse {
    pub added: bool,
}

/// Outcome of one source in a manual sync run
#[derive(Debug, Serialize)]
pub struct SourceSyncOutcome {
    pub source_id: String,
    pub success: bool,
    pub summary: Option<SyncSummary>,
    pub error: Option<String>,
}
