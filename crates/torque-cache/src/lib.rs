//! Session-scoped semantic response cache.
//!
//! Keys are query embeddings, not exact text: a lookup embeds the incoming
//! query and returns the stored response whose embedding is nearest by
//! cosine, provided it clears the similarity threshold and belongs to the
//! same session. Entries expire on the session TTL; eviction is lazy on
//! lookup with a `sweep()` for periodic cleanup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use torque_index::cosine_similarity;
use torque_llm::EmbeddingProvider;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Embedding backend down. Callers treat lookup failure as a miss and
    /// skip the store on completion.
    #[error("Semantic cache unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

struct CacheEntry {
    query_embedding: Vec<f32>,
    canonical_query: String,
    response: String,
    created_at: Instant,
}

/// A cache hit with the similarity that produced it.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub response: String,
    pub canonical_query: String,
    pub similarity: f32,
}

pub struct SemanticCache {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: DashMap<String, Vec<CacheEntry>>,
    threshold: f32,
    ttl: Duration,
}

impl SemanticCache {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, threshold: f32, ttl: Duration) -> Self {
        Self {
            embedder,
            entries: DashMap::new(),
            threshold,
            ttl,
        }
    }

    /// Nearest same-session entry at or above the threshold, or `None`.
    pub async fn lookup(&self, session_id: &str, query: &str) -> Result<Option<CacheHit>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let Some(mut session_entries) = self.entries.get_mut(session_id) else {
            return Ok(None);
        };

        // Lazy TTL eviction for this session only.
        session_entries.retain(|e| e.created_at.elapsed() < self.ttl);

        let best = session_entries
            .iter()
            .map(|e| (cosine_similarity(&embedding, &e.query_embedding), e))
            .max_by(|(a, _), (b, _)| a.total_cmp(b));

        match best {
            Some((similarity, entry)) if similarity >= self.threshold => {
                info!(
                    session = session_id,
                    similarity,
                    canonical = %entry.canonical_query,
                    "semantic cache hit"
                );
                Ok(Some(CacheHit {
                    response: entry.response.clone(),
                    canonical_query: entry.canonical_query.clone(),
                    similarity,
                }))
            }
            Some((similarity, _)) => {
                debug!(session = session_id, similarity, "semantic cache near-miss");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Insert a completed response under its query embedding.
    pub async fn store(&self, session_id: &str, query: &str, response: &str) -> Result<()> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        self.entries
            .entry(session_id.to_string())
            .or_default()
            .push(CacheEntry {
                query_embedding: embedding,
                canonical_query: query.to_string(),
                response: response.to_string(),
                created_at: Instant::now(),
            });
        Ok(())
    }

    /// Evict expired entries across all sessions. Returns entries removed.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.created_at.elapsed() < self.ttl);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use torque_llm::ProviderError;

    /// Deterministic toy embedder: byte histogram over 64 buckets. Close
    /// strings land close; unrelated strings don't.
    struct HashEmbedder;

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        fn name(&self) -> &str {
            "hash"
        }
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            let mut v = vec![0.0f32; 64];
            for b in text.to_lowercase().bytes() {
                v[(b % 64) as usize] += 1.0;
            }
            Ok(v)
        }
        fn dimensions(&self) -> usize {
            64
        }
    }

    /// Always-failing embedder for the unavailability path.
    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        fn name(&self) -> &str {
            "down"
        }
        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Unavailable("no backend".to_string()))
        }
        fn dimensions(&self) -> usize {
            0
        }
    }

    fn cache(threshold: f32) -> SemanticCache {
        SemanticCache::new(Arc::new(HashEmbedder), threshold, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn store_then_lookup_same_query_hits() {
        let c = cache(0.96);
        c.store("s1", "Haval H6 price Pakistan", "around 8 lacs")
            .await
            .unwrap();
        let hit = c.lookup("s1", "Haval H6 price Pakistan").await.unwrap();
        let hit = hit.expect("exact query must hit");
        assert_eq!(hit.response, "around 8 lacs");
        assert!(hit.similarity > 0.999);
    }

    #[tokio::test]
    async fn lookup_never_crosses_sessions() {
        let c = cache(0.9);
        c.store("s1", "Haval H6 price", "R").await.unwrap();
        assert!(c.lookup("s2", "Haval H6 price").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dissimilar_query_misses() {
        let c = cache(0.96);
        c.store("s1", "Haval H6 price Pakistan", "R").await.unwrap();
        let miss = c.lookup("s1", "zzzz qqqq xxxx").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn empty_cache_misses() {
        let c = cache(0.96);
        assert!(c.lookup("s1", "anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_lazily() {
        let c = SemanticCache::new(Arc::new(HashEmbedder), 0.9, Duration::from_millis(0));
        c.store("s1", "q", "r").await.unwrap();
        assert!(c.lookup("s1", "q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_reports_removed_entries() {
        let c = SemanticCache::new(Arc::new(HashEmbedder), 0.9, Duration::from_millis(0));
        c.store("s1", "a", "r").await.unwrap();
        c.store("s2", "b", "r").await.unwrap();
        assert_eq!(c.sweep(), 2);
        assert_eq!(c.sweep(), 0);
    }

    #[tokio::test]
    async fn embedder_outage_is_unavailable_not_a_miss() {
        let c = SemanticCache::new(Arc::new(DownEmbedder), 0.96, Duration::from_secs(60));
        let err = c.lookup("s1", "q").await.unwrap_err();
        assert!(matches!(err, CacheError::Unavailable(_)));
    }
}
