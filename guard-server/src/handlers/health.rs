//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use super::run_blocking;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    active_signatures: Option<usize>,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let count = run_blocking(&state, |guard| guard.active_signatures().map(|s| s.len()))
        .await
        .ok()
        .and_then(|r| r.ok());

    Json(HealthResponse {
        status: if count.is_some() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        active_signatures: count,
    })
}
