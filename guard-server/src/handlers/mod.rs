//! HTTP handlers

pub mod admin;
pub mod detect;
pub mod health;
pub mod rate;
pub mod verify;
pub mod visits;

use crawlguard_core::CrawlGuard;

use crate::{AppResult, AppState};

/// Run a core call on the blocking pool; the core does SQLite and DNS I/O
pub(crate) async fn run_blocking<T, F>(state: &AppState, f: F) -> AppResult<T>
where
    F: FnOnce(&CrawlGuard) -> T + Send + 'static,
    T: Send + 'static,
{
    let guard = state.guard.clone();
    Ok(tokio::task::spawn_blocking(move || f(&guard)).await?)
}
