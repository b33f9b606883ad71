use thiserror::Error;

use crate::error::{CacheError, ErrorKind};

#[derive(Debug, Error)]
pub enum FarCacheError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl FarCacheError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            FarCacheError::Connection(_) => ErrorKind::L2Connection,
            FarCacheError::Timeout(_) => ErrorKind::L2Timeout,
            FarCacheError::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

impl From<FarCacheError> for CacheError {
    fn from(err: FarCacheError) -> Self {
        match err {
            FarCacheError::Connection(msg) => CacheError::FarConnection(msg),
            FarCacheError::Timeout(msg) => CacheError::FarTimeout(msg),
            FarCacheError::Serialization(msg) => CacheError::Serialization(msg),
        }
    }
}

pub type FarCacheResult<T> = Result<T, FarCacheError>;
