//! Event sink that forwards domain events to tracing

use crawlguard_core::{EventSink, GuardEvent};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: GuardEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        if event.is_alert() {
            tracing::warn!(event = event.name(), %payload, "guard event");
        } else {
            tracing::info!(event = event.name(), %payload, "guard event");
        }
    }
}
