use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The backing store is unreachable. The pipeline treats this as a
    /// degraded mode (history-less), never as a request failure.
    #[error("Session store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for MemoryError {
    fn from(e: redis::RedisError) -> Self {
        MemoryError::Unavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
