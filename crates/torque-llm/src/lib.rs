pub mod anthropic;
pub mod caller;
pub mod embedding;
pub mod error;
pub mod ollama;
pub mod openai;
pub mod parallel;
pub mod provider;
pub mod registry;
pub mod sse;
pub mod stream;

pub use caller::LlmCaller;
pub use embedding::EmbeddingProvider;
pub use error::LlmError;
pub use provider::{ChatMessage, ChatRequest, ChatResponse, ChatRole, LlmProvider, ProviderError};
pub use registry::{ProviderKind, TaskConfig, TaskRegistry};
pub use stream::StreamEvent;
