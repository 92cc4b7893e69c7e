use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Pipeline constants shared across crates.
pub const DEFAULT_SESSION_WINDOW: usize = 4; // two rounds
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.96;
pub const SIMILARITY_THRESHOLD_MIN: f32 = 0.90;
pub const SIMILARITY_THRESHOLD_MAX: f32 = 0.99;
pub const DEFAULT_TOP_K_RETRIEVE: usize = 20;
pub const DEFAULT_TOP_K_RERANK: usize = 10;
pub const DEFAULT_SQL_ROW_CAP: usize = 1000;
pub const DEFAULT_SQL_TIME_CAP_MS: u64 = 5_000;

/// Top-level config (torque.toml + TORQUE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TorqueConfig {
    #[serde(default)]
    pub company: CompanyConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub sql: SqlConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub tasks: Vec<TaskOverride>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// The corpus scope: a domain label shown to the classifiers and the set
/// of enabled sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    #[serde(default = "default_domain_label")]
    pub domain_label: String,
    /// Sources the company has enabled (index names, e.g. "conversations").
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    /// Sources whose queries carry first-class entities (e.g. customer
    /// names in chat logs). These get the entity-router treatment.
    #[serde(default)]
    pub entity_sources: Vec<String>,
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            domain_label: default_domain_label(),
            sources: default_sources(),
            entity_sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_session_window")]
    pub session_window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            session_ttl_secs: default_session_ttl_secs(),
            session_window: default_session_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl CacheConfig {
    /// Threshold clamped to the supported range. Values outside
    /// [0.90, 0.99] come from operator typos; the cache never runs with them.
    pub fn threshold(&self) -> f32 {
        self.similarity_threshold
            .clamp(SIMILARITY_THRESHOLD_MIN, SIMILARITY_THRESHOLD_MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k_retrieve")]
    pub top_k_retrieve: usize,
    #[serde(default = "default_top_k_rerank")]
    pub top_k_rerank: usize,
    /// Hard cap on the assembled context window, in characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_retrieve: default_top_k_retrieve(),
            top_k_rerank: default_top_k_rerank(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConfig {
    #[serde(default = "default_sql_db_path")]
    pub db_path: String,
    #[serde(default = "default_sql_row_cap")]
    pub row_cap: usize,
    #[serde(default = "default_sql_time_cap_ms")]
    pub time_cap_ms: u64,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            db_path: default_sql_db_path(),
            row_cap: default_sql_row_cap(),
            time_cap_ms: default_sql_time_cap_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAiConfig>,
    pub ollama: Option<OllamaConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

/// Per-task model override. Unset fields fall back to the built-in
/// defaults for that task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOverride {
    pub task: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Falls back to `providers.openai.api_key` when unset.
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: default_openai_base_url(),
            api_key: None,
        }
    }
}

fn default_domain_label() -> String {
    "automotive dealership".to_string()
}
fn default_sources() -> Vec<String> {
    vec!["conversations".to_string()]
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}
fn default_session_window() -> usize {
    DEFAULT_SESSION_WINDOW
}
fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}
fn default_top_k_retrieve() -> usize {
    DEFAULT_TOP_K_RETRIEVE
}
fn default_top_k_rerank() -> usize {
    DEFAULT_TOP_K_RERANK
}
fn default_max_context_chars() -> usize {
    12_000
}
fn default_sql_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.torque/dealership.db", home)
}
fn default_sql_row_cap() -> usize {
    DEFAULT_SQL_ROW_CAP
}
fn default_sql_time_cap_ms() -> u64 {
    DEFAULT_SQL_TIME_CAP_MS
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl TorqueConfig {
    /// Load config from a TOML file with TORQUE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.torque/torque.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TorqueConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TORQUE_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.torque/torque.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = TorqueConfig::default();
        assert_eq!(cfg.memory.session_window, 4);
        assert_eq!(cfg.memory.session_ttl_secs, 86_400);
        assert_eq!(cfg.cache.similarity_threshold, 0.96);
        assert_eq!(cfg.retrieval.top_k_retrieve, 20);
        assert_eq!(cfg.retrieval.top_k_rerank, 10);
        assert_eq!(cfg.sql.row_cap, 1000);
    }

    #[test]
    fn threshold_is_clamped_to_supported_range() {
        let low = CacheConfig {
            similarity_threshold: 0.5,
        };
        assert_eq!(low.threshold(), SIMILARITY_THRESHOLD_MIN);

        let high = CacheConfig {
            similarity_threshold: 1.0,
        };
        assert_eq!(high.threshold(), SIMILARITY_THRESHOLD_MAX);

        let ok = CacheConfig {
            similarity_threshold: 0.93,
        };
        assert_eq!(ok.threshold(), 0.93);
    }
}
