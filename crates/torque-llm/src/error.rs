use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No model configured for task: {task}")]
    ConfigMissing { task: String },

    #[error("No provider registered for kind: {kind}")]
    ProviderMissing { kind: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl LlmError {
    /// Short error code string for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            LlmError::ConfigMissing { .. } => "CONFIG_MISSING",
            LlmError::ProviderMissing { .. } => "PROVIDER_MISSING",
            LlmError::Provider(_) => "PROVIDER_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
