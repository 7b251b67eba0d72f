//! Catalog Sync Module - third-party signature list import
//!
//! # Components
//! - `types.rs`: feed sources, summaries, history records
//! - `parser.rs`: JSON / PHP array / line payloads
//! - `sync.rs`: fetcher trait, HTTP fetcher, synchronizer

pub mod parser;
pub mod sync;
pub mod types;

pub use sync::{CatalogSynchronizer, HttpFetcher, PatternFetcher};
pub use types::{default_sources, FeedFormat, FeedSource, SyncRecord, SyncStatus, SyncSummary};
