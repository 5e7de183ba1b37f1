use thiserror::Error;

/// Errors surfaced by the store boundary.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Malformed attempt input. Rejected immediately, never partially applied.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown user/topic/recommendation on a read. No recomputation attempted.
    #[error("not found: {0}")]
    NotFound(String),

    /// A recomputation was requested while one was already in flight and the
    /// caller's wait budget elapsed before it finished.
    #[error("recomputation for user {0} timed out; cached data unavailable")]
    Stale(String),

    /// Unexpected failure inside aggregation/scoring. The previous cached
    /// snapshot is retained.
    #[error("computation failed: {0}")]
    Computation(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            StoreError::InvalidTransition { from, to } => {
                EngineError::Validation(format!("invalid status transition from {from} to {to}"))
            }
            other => EngineError::Computation(other.to_string()),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
