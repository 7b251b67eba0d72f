//! CrawlGuard Server
//!
//! HTTP front for the crawler detection core.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CRAWLGUARD SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │  API      │  │  Admin    │  │  Scheduled Jobs         │ │
//! │  │  (Axum)   │  │  Key      │  │  (sync / learn / purge) │ │
//! │  └─────┬─────┘  └─────┬─────┘  └────────────┬────────────┘ │
//! │        └──────────────┼──────────────────────┘              │
//! │                       ▼  spawn_blocking                     │
//! │                ┌─────────────┐                             │
//! │                │ CrawlGuard  │──── SQLite (WAL)            │
//! │                └─────────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod handlers;
mod jobs;
mod middleware;
mod models;
mod sink;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware as axum_middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlguard_core::{default_sources, CrawlGuard, FeedSource, SharedSettings};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (also captures the core's `log` records)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "crawlguard_server=debug,crawlguard_core=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("CrawlGuard Server starting ({})...", config.environment);
    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!(
        "Jobs: sync every {}h, learn every {}h; timeouts: dns {}ms, fetch {}s",
        config.sync_interval_hours, config.learn_interval_hours,
        config.dns_timeout_ms, config.fetch_timeout_secs
    );
    if config.admin_api_key.is_none() {
        if config.is_production() {
            tracing::warn!("ADMIN_API_KEY is not set; admin routes are disabled");
        } else {
            tracing::info!("ADMIN_API_KEY is not set; admin routes are disabled");
        }
    }

    let settings = SharedSettings::new(config.load_settings()?);

    let db_path = config.database_path.clone();
    let guard = tokio::task::spawn_blocking(move || -> anyhow::Result<CrawlGuard> {
        let guard = CrawlGuard::open(&db_path, settings, Arc::new(sink::TracingSink))?;
        let seeded = guard.seed_builtin_catalog()?;
        if seeded > 0 {
            tracing::info!("Seeded {} built-in signatures", seeded);
        }
        Ok(guard)
    })
    .await??;

    let state = AppState::new(guard, config.clone(), default_sources());
    let _jobs = jobs::spawn_all(&state);

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<CrawlGuard>,
    pub config: config::Config,
    pub sources: Arc<Vec<FeedSource>>,
    /// SHA-256 hex of the admin key
    pub admin_key_hash: Option<String>,
}

impl AppState {
    pub fn new(guard: CrawlGuard, config: config::Config, sources: Vec<FeedSource>) -> Self {
        let admin_key_hash = config.admin_api_key.as_deref().map(middleware::admin::hash_key);
        Self {
            guard: Arc::new(guard),
            config,
            sources: Arc::new(sources),
            admin_key_hash,
        }
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/v1/detect", post(handlers::detect::detect))
        .route("/api/v1/verify", post(handlers::verify::verify))
        .route("/api/v1/visits", post(handlers::visits::record))
        .route("/api/v1/rate/check", post(handlers::rate::check))
        .route("/api/v1/rate/consume", post(handlers::rate::consume));

    // Admin routes (X-Admin-Key)
    let admin_routes = Router::new()
        .route("/api/v1/admin/sync", post(handlers::admin::sync_now))
        .route("/api/v1/admin/sync/history", get(handlers::admin::sync_history))
        .route("/api/v1/admin/learn", post(handlers::admin::learn_now))
        .route("/api/v1/admin/unknown", get(handlers::admin::unknown))
        .route("/api/v1/admin/signatures", get(handlers::admin::signatures))
        .route("/api/v1/admin/signatures/:id/active", put(handlers::admin::set_active))
        .route("/api/v1/admin/ranges", post(handlers::admin::add_range))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin::require_admin_key
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
