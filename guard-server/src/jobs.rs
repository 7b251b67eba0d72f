//! Scheduled background jobs
//!
//! Each job ticks on its own tokio interval and calls the blocking core
//! through `spawn_blocking`. The first tick is one full period after start.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::AppState;

const HOUR: Duration = Duration::from_secs(3600);
const PURGE_PERIOD: Duration = Duration::from_secs(600);

pub fn spawn_all(state: &AppState) -> Vec<JoinHandle<()>> {
    vec![
        spawn_sync_job(state.clone()),
        spawn_learn_job(state.clone()),
        spawn_purge_job(state.clone()),
    ]
}

fn every(period: Duration) -> tokio::time::Interval {
    interval_at(Instant::now() + period, period)
}

/// External catalog sync (weekly by default)
fn spawn_sync_job(state: AppState) -> JoinHandle<()> {
    let period = HOUR * state.config.sync_interval_hours as u32;
    tokio::spawn(async move {
        let mut ticker = every(period);
        loop {
            ticker.tick().await;
            let guard = state.guard.clone();
            let sources = state.sources.clone();
            match tokio::task::spawn_blocking(move || guard.sync_sources(&sources)).await {
                Ok(results) => {
                    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                    tracing::info!("Scheduled sync finished: {} sources, {} failed", results.len(), failed);
                }
                Err(e) => tracing::error!("Scheduled sync task panicked: {}", e),
            }
        }
    })
}

/// Auto-learner (daily by default)
fn spawn_learn_job(state: AppState) -> JoinHandle<()> {
    let period = HOUR * state.config.learn_interval_hours as u32;
    tokio::spawn(async move {
        let mut ticker = every(period);
        loop {
            ticker.tick().await;
            let guard = state.guard.clone();
            match tokio::task::spawn_blocking(move || guard.run_learner()).await {
                Ok(Ok(report)) => tracing::info!(
                    "Scheduled learn run: examined={} learned={} duplicates={} rejected={} failed={}",
                    report.examined, report.learned, report.duplicates, report.rejected, report.failed
                ),
                Ok(Err(e)) => tracing::error!("Scheduled learn run failed: {}", e),
                Err(e) => tracing::error!("Scheduled learn task panicked: {}", e),
            }
        }
    })
}

/// Drop expired rate windows
fn spawn_purge_job(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = every(PURGE_PERIOD);
        loop {
            ticker.tick().await;
            let guard = state.guard.clone();
            if let Ok(Err(e)) = tokio::task::spawn_blocking(move || guard.purge_expired_windows()).await {
                tracing::warn!("Rate window purge failed: {}", e);
            }
        }
    })
}
