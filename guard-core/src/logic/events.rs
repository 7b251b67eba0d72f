//! Domain events
//!
//! Components report noteworthy outcomes through an injected `EventSink`
//! instead of calling alerting code directly. Emitting never fails and
//! never blocks the caller's result.

#[cfg(test)]
use parking_lot::Mutex;
use serde::Serialize;

use super::catalog_sync::types::SyncSummary;
use super::rate_limit::types::LimitWindow;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardEvent {
    NewUnknownIdentifier {
        identifier: String,
        identifier_hash: String,
        confidence: f64,
        suggested_name: Option<String>,
    },
    QueueWriteFailed {
        identifier_hash: String,
        error: String,
    },
    SignatureLearned {
        signature_id: i64,
        bot_name: String,
        pattern: String,
        confidence: f64,
    },
    CatalogSynced {
        source_id: String,
        version: String,
        summary: SyncSummary,
    },
    CatalogSyncFailed {
        source_id: String,
        version: String,
        error: String,
    },
    VerificationFailed {
        identity: String,
        origin_address: String,
    },
    RateLimited {
        identity: String,
        origin_address: String,
        window: LimitWindow,
        retry_after: u64,
    },
}

impl GuardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GuardEvent::NewUnknownIdentifier { .. } => "new_unknown_identifier",
            GuardEvent::QueueWriteFailed { .. } => "queue_write_failed",
            GuardEvent::SignatureLearned { .. } => "signature_learned",
            GuardEvent::CatalogSynced { .. } => "catalog_synced",
            GuardEvent::CatalogSyncFailed { .. } => "catalog_sync_failed",
            GuardEvent::VerificationFailed { .. } => "verification_failed",
            GuardEvent::RateLimited { .. } => "rate_limited",
        }
    }

    /// Failures and denials; everything else is informational
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            GuardEvent::QueueWriteFailed { .. }
                | GuardEvent::CatalogSyncFailed { .. }
                | GuardEvent::VerificationFailed { .. }
        )
    }
}

/// Receiver for domain events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GuardEvent);
}

/// Writes every event to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: GuardEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        if event.is_alert() {
            log::warn!("[event] {} {}", event.name(), payload);
        } else {
            log::info!("[event] {} {}", event.name(), payload);
        }
    }
}

/// Drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: GuardEvent) {}
}

/// Keeps every event in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<GuardEvent>>,
}

#[cfg(test)]
impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GuardEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
impl EventSink for CollectingSink {
    fn emit(&self, event: GuardEvent) {
        self.events.lock().push(event);
    }
}
