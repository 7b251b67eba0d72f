//! Rate limit handlers

use axum::{extract::State, Json};
use validator::Validate;

use crawlguard_core::RateCheck;

use super::run_blocking;
use crate::models::RateRequest;
use crate::{AppError, AppResult, AppState};

/// Status only; consumes nothing
pub async fn check(
    State(state): State<AppState>,
    Json(req): Json<RateRequest>,
) -> AppResult<Json<RateCheck>> {
    req.validate()?;
    let result = run_blocking(&state, move |guard| {
        guard.check_rate(&req.identity, &req.origin_address, req.tier)
    })
    .await?;
    Ok(Json(result))
}

/// Spend one request: 403 when blocked, 429 + Retry-After when over budget
pub async fn consume(
    State(state): State<AppState>,
    Json(req): Json<RateRequest>,
) -> AppResult<Json<RateCheck>> {
    req.validate()?;

    let identity = req.identity.clone();
    let outcome = run_blocking(&state, move |guard| {
        if guard.is_blocked(&req.identity) {
            return Ok(None);
        }
        guard.consume_rate(&req.identity, &req.origin_address, req.tier).map(Some)
    })
    .await??;

    match outcome {
        None => {
            tracing::info!("Blocked identity refused: {}", identity);
            Err(AppError::Forbidden(identity))
        }
        Some(check) if !check.allowed => Err(AppError::RateLimited(check)),
        Some(check) => Ok(Json(check)),
    }
}
