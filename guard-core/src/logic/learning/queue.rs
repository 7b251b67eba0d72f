//! Unknown-Identifier Queue

use std::sync::Arc;

use super::types::{Sighting, UnknownObservation, UpsertOutcome};
use crate::error::StoreError;
use crate::logic::detection::types::DetectionResult;
use crate::logic::events::{EventSink, GuardEvent};
use crate::logic::unix_now;
use crate::store::UnknownRepository;

pub struct UnknownQueue {
    repo: Arc<dyn UnknownRepository>,
    events: Arc<dyn EventSink>,
}

impl UnknownQueue {
    pub fn new(repo: Arc<dyn UnknownRepository>, events: Arc<dyn EventSink>) -> Self {
        Self { repo, events }
    }

    pub fn record(&self, identifier: &str, result: &DetectionResult) -> Result<UpsertOutcome, StoreError> {
        self.record_at(identifier, result, unix_now())
    }

    /// Merge one low-confidence sighting.
    ///
    /// A write failure is logged and emitted as `QueueWriteFailed` before
    /// being returned; callers on the request path may ignore it.
    pub fn record_at(
        &self,
        identifier: &str,
        result: &DetectionResult,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        let sighting = Sighting::new(identifier, result.bot_name(), result.confidence(), now);

        match self.repo.upsert_observation(&sighting) {
            Ok(outcome) => {
                if outcome.first_sighting {
                    log::debug!("New unknown identifier queued: {}", identifier);
                    self.events.emit(GuardEvent::NewUnknownIdentifier {
                        identifier: identifier.to_string(),
                        identifier_hash: sighting.identifier_hash.clone(),
                        confidence: outcome.observation.confidence,
                        suggested_name: outcome.observation.suggested_name.clone(),
                    });
                }
                Ok(outcome)
            }
            Err(e) => {
                log::error!("Unknown-queue write failed for {}: {}", sighting.identifier_hash, e);
                self.events.emit(GuardEvent::QueueWriteFailed {
                    identifier_hash: sighting.identifier_hash,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Pending observations at or above `min_confidence`, highest first
    pub fn pending(&self, min_confidence: f64, limit: usize) -> Result<Vec<UnknownObservation>, StoreError> {
        self.repo.pending_observations(min_confidence, limit)
    }
}
