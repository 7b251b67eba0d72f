//! Detection Pipeline - cheapest detector first, early exit when confident

use std::sync::Arc;

use super::heuristic::HeuristicDetector;
use super::known_pattern::KnownPatternDetector;
use super::types::DetectionResult;
use crate::logic::learning::queue::UnknownQueue;

pub struct DetectionPipeline {
    known: Arc<KnownPatternDetector>,
    heuristic: HeuristicDetector,
    queue: Arc<UnknownQueue>,
}

impl DetectionPipeline {
    pub fn new(known: Arc<KnownPatternDetector>, heuristic: HeuristicDetector, queue: Arc<UnknownQueue>) -> Self {
        Self { known, heuristic, queue }
    }

    pub fn detect(&self, identifier: &str) -> DetectionResult {
        let known = self.known.detect(identifier);
        if known.is_confident() {
            return known;
        }

        let heuristic = self.heuristic.detect(identifier);
        let result = if heuristic.confidence() > known.confidence() { heuristic } else { known };

        // Nothing to learn from a blank identifier
        if !result.is_confident() && !identifier.trim().is_empty() {
            // Failure already logged and emitted by the queue
            let _ = self.queue.record(identifier, &result);
        }

        result
    }
}
