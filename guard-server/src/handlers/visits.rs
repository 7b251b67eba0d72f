//! Visit recording handler

use axum::{extract::State, Json};
use validator::Validate;

use crawlguard_core::{Visit, VisitFingerprint};

use super::run_blocking;
use crate::models::VisitRequest;
use crate::{AppResult, AppState};

pub async fn record(
    State(state): State<AppState>,
    Json(req): Json<VisitRequest>,
) -> AppResult<Json<VisitFingerprint>> {
    req.validate()?;

    let timestamp = req.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let mut visit = Visit::new(&req.identifier, &req.origin_address, timestamp);
    if let Some(path) = &req.path {
        visit = visit.with_path(path);
    }
    if let Some(classification) = &req.classification {
        visit = visit.with_classification(classification);
    }

    let fingerprint = run_blocking(&state, move |guard| guard.record_visit(&visit)).await??;
    Ok(Json(fingerprint))
}
