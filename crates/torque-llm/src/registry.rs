//! Per-task model registry.
//!
//! Every LLM call in the pipeline is made under a named task. The registry
//! maps task name → `{provider, model, temperature, max_tokens}` and is
//! immutable after construction; unknown tasks fail with `ConfigMissing`
//! rather than falling back to a guess.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use torque_core::config::TaskOverride;

use crate::error::LlmError;

/// Task names used by the pipeline. Kept as constants so call sites can't
/// drift from the registry keys.
pub mod task {
    pub const DOMAIN_CLASSIFICATION: &str = "domain_classification";
    pub const CONTEXT_SELECTION: &str = "context_selection";
    pub const INTENT_CLASSIFICATION: &str = "intent_classification";
    pub const COMPRESSION: &str = "compression";
    pub const REFORMULATION: &str = "reformulation";
    pub const ENTITY_EXTRACTION: &str = "entity_extraction";
    pub const FORMAT_DETECTION: &str = "format_detection";
    pub const CITATION_CHECK: &str = "citation_check";
    pub const KEYWORD_EXTRACTION: &str = "keyword_extraction";
    pub const SMALL_TALK: &str = "small_talk";
    pub const ANSWER_THINKING: &str = "answer_thinking";
    pub const ANSWER_NON_THINKING: &str = "answer_non_thinking";
    pub const SQL_CLASSIFICATION: &str = "sql_classification";
    pub const SQL_ENTITY_EXTRACTION: &str = "sql_entity_extraction";
    pub const SQL_GENERATION: &str = "sql_generation";
    pub const RESULT_FORMATTING: &str = "result_formatting";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Ollama,
}

impl ProviderKind {
    /// Parse from a string slug. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Some(ProviderKind::Anthropic),
            "openai" => Some(ProviderKind::OpenAi),
            "ollama" => Some(ProviderKind::Ollama),
            _ => None,
        }
    }
}

/// Resolved model parameters for one task.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Immutable task-name → model-config table.
pub struct TaskRegistry {
    tasks: HashMap<&'static str, TaskConfig>,
}

impl TaskRegistry {
    /// Build from the defaults, then apply config-file overrides.
    /// Overrides naming an unknown task are logged and dropped.
    pub fn new(overrides: &[TaskOverride]) -> Self {
        let mut tasks = defaults();

        for ov in overrides {
            let Some(entry) = tasks.get_mut(ov.task.as_str()) else {
                warn!(task = %ov.task, "ignoring override for unknown task");
                continue;
            };
            if let Some(p) = ov.provider.as_deref().and_then(ProviderKind::parse) {
                entry.provider = p;
            }
            if let Some(m) = &ov.model {
                entry.model = m.clone();
            }
            if let Some(t) = ov.temperature {
                entry.temperature = t;
            }
            if let Some(mt) = ov.max_tokens {
                entry.max_tokens = mt;
            }
        }

        Self { tasks }
    }

    /// Total lookup: unknown task is a configuration bug, not a fallback.
    pub fn get(&self, task: &str) -> Result<&TaskConfig, LlmError> {
        self.tasks.get(task).ok_or_else(|| LlmError::ConfigMissing {
            task: task.to_string(),
        })
    }

    /// All provider kinds the registry routes to. Used at startup to check
    /// every required provider has credentials.
    pub fn required_providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.tasks.values().map(|c| c.provider).collect();
        kinds.sort_by_key(|k| format!("{k:?}"));
        kinds.dedup();
        kinds
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(&[])
    }
}

// Built-in per-task defaults. Classifier-tier tasks run on the cheapest
// deterministic settings; answer tasks get the larger model and budget.
fn defaults() -> HashMap<&'static str, TaskConfig> {
    use ProviderKind::*;

    let haiku = "claude-haiku-4-5";
    let sonnet = "claude-sonnet-4-6";

    let mut m = HashMap::new();
    m.insert(
        task::DOMAIN_CLASSIFICATION,
        cfg(Anthropic, haiku, 0.0, 20),
    );
    m.insert(task::CONTEXT_SELECTION, cfg(Anthropic, haiku, 0.0, 60));
    m.insert(task::INTENT_CLASSIFICATION, cfg(Anthropic, haiku, 0.0, 10));
    m.insert(task::COMPRESSION, cfg(Anthropic, haiku, 0.0, 100));
    m.insert(task::REFORMULATION, cfg(Anthropic, haiku, 0.0, 120));
    m.insert(task::ENTITY_EXTRACTION, cfg(Anthropic, haiku, 0.0, 80));
    m.insert(task::FORMAT_DETECTION, cfg(OpenAi, "gpt-4o-mini", 0.0, 40));
    m.insert(task::CITATION_CHECK, cfg(Anthropic, haiku, 0.0, 10));
    m.insert(task::KEYWORD_EXTRACTION, cfg(Anthropic, haiku, 0.0, 60));
    m.insert(task::SMALL_TALK, cfg(Anthropic, haiku, 0.7, 150));
    m.insert(task::ANSWER_NON_THINKING, cfg(Anthropic, sonnet, 0.3, 1024));
    m.insert(task::ANSWER_THINKING, cfg(Anthropic, sonnet, 0.3, 4096));
    m.insert(task::SQL_CLASSIFICATION, cfg(Anthropic, haiku, 0.0, 20));
    m.insert(
        task::SQL_ENTITY_EXTRACTION,
        cfg(Anthropic, haiku, 0.0, 200),
    );
    m.insert(task::SQL_GENERATION, cfg(Anthropic, sonnet, 0.0, 400));
    m.insert(task::RESULT_FORMATTING, cfg(Anthropic, haiku, 0.2, 400));
    m
}

fn cfg(provider: ProviderKind, model: &str, temperature: f32, max_tokens: u32) -> TaskConfig {
    TaskConfig {
        provider,
        model: model.to_string(),
        temperature,
        max_tokens,
    }
}
