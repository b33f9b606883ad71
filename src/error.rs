//! Crate-wide error taxonomy.
//!
//! The facade itself never surfaces these to callers (`get` degrades to a
//! miss, writes are best-effort); they exist so internal layers can classify
//! failures for retry-set membership and breaker accounting.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("near-cache error: {0}")]
    Near(String),

    #[error("far-cache connection error: {0}")]
    FarConnection(String),

    #[error("far-cache timeout: {0}")]
    FarTimeout(String),

    #[error("data source error: {0}")]
    DataSource(String),

    #[error("lock wait timed out after {0:?}")]
    LockTimeout(Duration),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Near(_) => ErrorKind::L1Error,
            CacheError::FarConnection(_) => ErrorKind::L2Connection,
            CacheError::FarTimeout(_) => ErrorKind::L2Timeout,
            CacheError::DataSource(_) => ErrorKind::DataSource,
            CacheError::LockTimeout(_) => ErrorKind::LockTimeout,
            CacheError::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Failure kind, detached from any payload so it can sit in a retryable set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    L1Error,
    L2Connection,
    L2Timeout,
    DataSource,
    LockTimeout,
    Serialization,
}

impl ErrorKind {
    /// The kinds worth retrying by default: transient far-cache trouble and
    /// data-source hiccups.
    pub fn default_retryable() -> HashSet<ErrorKind> {
        HashSet::from([
            ErrorKind::L2Connection,
            ErrorKind::L2Timeout,
            ErrorKind::DataSource,
        ])
    }
}
