use thiserror::Error;

use torque_llm::LlmError;

#[derive(Debug, Error)]
pub enum SqlError {
    /// Validator rejection. The request gets a polite re-phrase response;
    /// the statement never reaches the database.
    #[error("Generated SQL rejected: {0}")]
    Invalid(String),

    /// Row or wall-clock cap exceeded during execution.
    #[error("Query exceeded capacity: {0}")]
    Capacity(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl SqlError {
    /// Short error code string for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            SqlError::Invalid(_) => "SQL_INVALID",
            SqlError::Capacity(_) => "SQL_CAPACITY",
            SqlError::Llm(_) => "LLM_ERROR",
            SqlError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SqlError>;
