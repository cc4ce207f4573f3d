//! Error types for the session pool

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Pool exhausted - no resource became available within {0:?}")]
    PoolExhausted(Duration),

    #[error("Failed to create pooled resource: {0}")]
    CreateFailed(Arc<dyn std::error::Error + Send + Sync>),

    #[error("Operation was cancelled")]
    Cancelled,
}

impl PoolError {
    /// Wrap a creation error from a resource callback
    pub fn create_failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PoolError::CreateFailed(Arc::new(err))
    }
}

impl From<PoolError> for std::io::Error {
    fn from(err: PoolError) -> Self {
        let kind = match &err {
            PoolError::PoolExhausted(_) => std::io::ErrorKind::TimedOut,
            PoolError::Cancelled => std::io::ErrorKind::Interrupted,
            PoolError::CreateFailed(_) => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
