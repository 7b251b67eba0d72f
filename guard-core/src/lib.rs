//! CrawlGuard Core - crawler detection, identity verification and throttling
//!
//! Synchronous library; every component works over the repository traits
//! in `store` and reports side effects through an `EventSink`.

pub mod constants;
pub mod error;
pub mod guard;
pub mod logic;
pub mod settings;
pub mod store;

pub use error::{DnsError, StoreError, SyncError, ValidationError};
pub use guard::CrawlGuard;
pub use logic::catalog_sync::{default_sources, FeedFormat, FeedSource, SyncRecord, SyncStatus, SyncSummary};
pub use logic::detection::{BotCategory, DetectionMethod, DetectionResult, PriorityTier, Signature};
pub use logic::events::{EventSink, GuardEvent, LogSink, NoopSink};
pub use logic::learning::{LearnReport, UnknownObservation};
pub use logic::rate_limit::{LimitWindow, RateCheck, TierLimits};
pub use logic::sessions::{Visit, VisitFingerprint};
pub use logic::verification::{VerificationMethod, VerificationResult};
pub use settings::{GuardSettings, SettingsSource, SharedSettings};
pub use store::{GuardStore, MemoryStore, SqliteStore};
