//! Identity verification handler

use axum::{extract::State, Json};
use validator::Validate;

use crawlguard_core::VerificationResult;

use super::run_blocking;
use crate::models::VerifyRequest;
use crate::{AppResult, AppState};

/// Check a claimed identity against its origin address (may hit DNS)
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> AppResult<Json<VerificationResult>> {
    req.validate()?;
    let result = run_blocking(&state, move |guard| guard.verify(&req.identity, &req.origin_address)).await?;
    Ok(Json(result))
}
