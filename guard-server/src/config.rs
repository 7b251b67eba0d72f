//! Configuration module

use std::env;
use std::path::PathBuf;

use crawlguard_core::constants::{
    default_database_path, get_dns_timeout_ms, get_fetch_timeout_secs, DEFAULT_LEARN_INTERVAL_HOURS,
    DEFAULT_SYNC_INTERVAL_HOURS,
};
use crawlguard_core::GuardSettings;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Server port
    pub port: u16,

    /// Admin API key; admin routes reject everything when unset
    pub admin_api_key: Option<String>,

    /// Environment (development, production)
    pub environment: String,

    /// Optional JSON file with the initial `GuardSettings`; admin range
    /// changes are written back to it
    pub settings_path: Option<PathBuf>,

    pub sync_interval_hours: u64,
    pub learn_interval_hours: u64,

    /// Informational; the core reads these itself
    pub dns_timeout_ms: u64,
    pub fetch_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_database_path()),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.trim().is_empty()),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            settings_path: env::var("SETTINGS_PATH").ok().map(PathBuf::from),

            sync_interval_hours: env::var("SYNC_INTERVAL_HOURS")
                .ok()
                .and_then(|h| h.parse().ok())
                .filter(|h| *h > 0)
                .unwrap_or(DEFAULT_SYNC_INTERVAL_HOURS),

            learn_interval_hours: env::var("LEARN_INTERVAL_HOURS")
                .ok()
                .and_then(|h| h.parse().ok())
                .filter(|h| *h > 0)
                .unwrap_or(DEFAULT_LEARN_INTERVAL_HOURS),

            dns_timeout_ms: get_dns_timeout_ms(),
            fetch_timeout_secs: get_fetch_timeout_secs(),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Initial settings: the JSON file when configured, defaults otherwise
    pub fn load_settings(&self) -> anyhow::Result<GuardSettings> {
        match &self.settings_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
                let settings = serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("parsing {}: {}", path.display(), e))?;
                Ok(settings)
            }
            None => Ok(GuardSettings::default()),
        }
    }

    /// Write `settings` back to the settings file, if one is configured.
    ///
    /// Returns `false` when there is no file and the change lives only in memory.
    pub fn save_settings(&self, settings: &GuardSettings) -> anyhow::Result<bool> {
        let Some(path) = &self.settings_path else {
            return Ok(false);
        };
        let raw = serde_json::to_string_pretty(settings)?;
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, raw)
            .map_err(|e| anyhow::anyhow!("writing {}: {}", staging.display(), e))?;
        std::fs::rename(&staging, path)
            .map_err(|e| anyhow::anyhow!("replacing {}: {}", path.display(), e))?;
        Ok(true)
    }
}
