//! Error types shared by the detection components

use thiserror::Error;

/// Failure of a repository read or write
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("duplicate key: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(err.to_string()),
            rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// A single rejected input (address, CIDR, pattern)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid network address: {0}")]
    InvalidAddress(String),

    #[error("invalid CIDR block: {0}")]
    InvalidCidr(String),

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// External catalog synchronization failure
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync already in progress")]
    AlreadyRunning,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {0} error")]
    Http(u16),

    #[error("parse failed: {0}")]
    Parse(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// DNS lookup failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("DNS lookup timed out")]
    Timeout,

    #[error("DNS lookup failed: {0}")]
    Lookup(String),

    /// Too many lookups already in flight; nothing was asked
    #[error("DNS resolver saturated ({0} lookups in flight)")]
    Saturated(usize),
}
