//! Detection handler

use axum::{extract::State, Json};
use validator::Validate;

use crawlguard_core::DetectionResult;

use super::run_blocking;
use crate::models::DetectRequest;
use crate::{AppResult, AppState};

/// Classify one identifier
pub async fn detect(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> AppResult<Json<DetectionResult>> {
    req.validate()?;
    let result = run_blocking(&state, move |guard| guard.detect(&req.identifier)).await?;
    Ok(Json(result))
}
