//! Error taxonomy shared by the pipeline stages.
//!
//! Per-item errors ([`FetchError`], [`ExtractError`]) are recorded and
//! isolated by the caller; [`ConfigError`] and [`DedupError`] are raised
//! before any I/O happens and abort the run. [`SearchError`] marks a
//! listing failure that aborts the run whenever it occurs.

use thiserror::Error;

/// Failure to retrieve one remote item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying: timeouts, connection resets, 5xx, throttling.
    #[error("transient fetch error: {0}")]
    Transient(String),
    /// Not retried: not found, authorization denied, unwritable destination.
    #[error("permanent fetch error: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// The bare reason, without the classification prefix.
    pub fn reason(&self) -> &str {
        match self {
            FetchError::Transient(r) | FetchError::Permanent(r) => r,
        }
    }
}

/// Search listing failure that no retry or later query can recover from.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    /// The service rejected the session (HTTP 401 or 403).
    #[error("search service rejected the session (HTTP {0})")]
    Unauthorized(u16),
}

/// Failure to turn a fetched file into text. The file stays on disk.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("corrupt document: {0}")]
    Corrupt(String),
    #[error("unsupported document: {0}")]
    Unsupported(String),
    #[error("extraction produced no text")]
    Empty,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid run configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Invalid deduplication parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DedupError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
}

impl From<DedupError> for ConfigError {
    fn from(err: DedupError) -> Self {
        match err {
            DedupError::InvalidParam(msg) => ConfigError::Invalid(msg),
        }
    }
}
