use thiserror::Error;

use torque_llm::LlmError;
use torque_sql::SqlError;

/// Fatal request errors. Degraded-path conditions (memory down, cache
/// down, parallel-task failures, empty retrieval) never surface here;
/// they are absorbed with safe defaults inside the controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Answer generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Structured query failed: {0}")]
    Sql(#[from] SqlError),

    #[error("request cancelled by caller")]
    Cancelled,
}

impl PipelineError {
    /// Short error code string for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Generation(_) => "GENERATION_FAILED",
            PipelineError::Sql(_) => "SQL_FAILED",
            PipelineError::Cancelled => "CANCELLED",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
