//! Administrative handlers (behind the admin key)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use validator::Validate;

use crawlguard_core::{LearnReport, SettingsSource, Signature, SyncRecord, UnknownObservation};

use super::run_blocking;
use crate::models::{
    AddRangeRequest, AddRangeResponse, HistoryQuery, LimitQuery, SetActiveRequest, SourceSyncOutcome,
};
use crate::{AppError, AppResult, AppState};

const DEFAULT_LIST_LIMIT: usize = 50;

/// Sync every configured source now
pub async fn sync_now(State(state): State<AppState>) -> AppResult<Json<Vec<SourceSyncOutcome>>> {
    let sources = state.sources.clone();
    let results = run_blocking(&state, move |guard| guard.sync_sources(&sources)).await?;

    let outcomes = results
        .into_iter()
        .map(|(source_id, result)| match result {
            Ok(summary) => SourceSyncOutcome { source_id, success: true, summary: Some(summary), error: None },
            Err(e) => SourceSyncOutcome { source_id, success: false, summary: None, error: Some(e.to_string()) },
        })
        .collect();

    Ok(Json(outcomes))
}

pub async fn sync_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<SyncRecord>>> {
    query.validate()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let records = run_blocking(&state, move |guard| guard.sync_history(query.source.as_deref(), limit)).await??;
    Ok(Json(records))
}

/// Run the auto-learner now
pub async fn learn_now(State(state): State<AppState>) -> AppResult<Json<LearnReport>> {
    let report = run_blocking(&state, |guard| guard.run_learner()).await??;
    tracing::info!(
        "Manual learn run: examined={} learned={} duplicates={}",
        report.examined, report.learned, report.duplicates
    );
    Ok(Json(report))
}

/// Pending unknown identifiers, highest confidence first
pub async fn unknown(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<UnknownObservation>>> {
    query.validate()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let pending = run_blocking(&state, move |guard| guard.pending_unknown(limit)).await??;
    Ok(Json(pending))
}

pub async fn signatures(State(state): State<AppState>) -> AppResult<Json<Vec<Signature>>> {
    let active = run_blocking(&state, |guard| guard.active_signatures()).await??;
    Ok(Json(active))
}

/// Activate or deactivate a signature
pub async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SetActiveRequest>,
) -> AppResult<Json<Signature>> {
    let updated = run_blocking(&state, move |guard| {
        guard.set_signature_active(id, req.active)?;
        guard.get_signature(id)
    })
    .await??
    .ok_or_else(|| AppError::NotFound("Signature not found".to_string()))?;

    tracing::info!("Signature {} ({}) active={}", updated.id, updated.bot_name, updated.is_active);
    Ok(Json(updated))
}

/// Register a custom network range for an identity.
///
/// The range applies to the next verification. It survives a restart only
/// when `SETTINGS_PATH` is configured: the updated settings are written back
/// to that file. Without it the range lives in memory and is lost on restart.
pub async fn add_range(
    State(state): State<AppState>,
    Json(req): Json<AddRangeRequest>,
) -> AppResult<Json<AddRangeResponse>> {
    req.validate()?;
    let added = state.guard.add_custom_range(&req.identity, &req.cidr)?;

    if added {
        let config = state.config.clone();
        let snapshot = state.guard.settings().snapshot();
        let persisted = tokio::task::spawn_blocking(move || config.save_settings(&snapshot))
            .await?
            .map_err(|e| AppError::InternalError(format!("range added but not saved: {}", e)))?;
        if !persisted {
            tracing::warn!("Custom range for {} is in memory only; set SETTINGS_PATH to keep it", req.identity);
        }
    }
    Ok(Json(AddRangeResponse { added }))
}
