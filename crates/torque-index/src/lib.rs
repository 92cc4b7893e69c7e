//! Vector index seam.
//!
//! The pipeline treats the corpus index as opaque: embeddings are built
//! offline by the ingestion system, and this crate only defines the search
//! interface plus an in-memory implementation for tests and small
//! deployments. Blocks are keyed by (company, source).

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Vector index unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// One indexed corpus block with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredBlock {
    pub block_id: String,
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// Similarity search over pre-built embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-k nearest blocks for the query embedding, best first.
    async fn search(
        &self,
        company_id: &str,
        source: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredBlock>>;

    /// Whether the source supports direct per-entity record lookup.
    fn supports_entity_lookup(&self, source: &str) -> bool {
        let _ = source;
        false
    }

    /// Fetch blocks tagged with the given entity (e.g. a customer name),
    /// bypassing similarity search. Default: none.
    async fn lookup_entity(
        &self,
        company_id: &str,
        source: &str,
        entity: &str,
        limit: usize,
    ) -> Result<Vec<ScoredBlock>> {
        let _ = (company_id, source, entity, limit);
        Ok(Vec::new())
    }
}

/// Cosine similarity. Mismatched or zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// A block as inserted into the in-memory index.
#[derive(Debug, Clone)]
pub struct IndexedBlock {
    pub block_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// In-memory vector index over a `DashMap` keyed by (company, source).
pub struct InMemoryVectorIndex {
    blocks: DashMap<String, Vec<IndexedBlock>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
        }
    }

    fn key(company_id: &str, source: &str) -> String {
        format!("{company_id}/{source}")
    }

    pub fn insert(&self, company_id: &str, source: &str, block: IndexedBlock) {
        self.blocks
            .entry(Self::key(company_id, source))
            .or_default()
            .push(block);
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        company_id: &str,
        source: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredBlock>> {
        let Some(blocks) = self.blocks.get(&Self::key(company_id, source)) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredBlock> = blocks
            .iter()
            .map(|b| ScoredBlock {
                block_id: b.block_id.clone(),
                text: b.text.clone(),
                score: cosine_similarity(embedding, &b.embedding),
                metadata: b.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn supports_entity_lookup(&self, _source: &str) -> bool {
        true
    }

    async fn lookup_entity(
        &self,
        company_id: &str,
        source: &str,
        entity: &str,
        limit: usize,
    ) -> Result<Vec<ScoredBlock>> {
        let Some(blocks) = self.blocks.get(&Self::key(company_id, source)) else {
            return Ok(Vec::new());
        };

        let needle = entity.to_lowercase();
        let mut out: Vec<ScoredBlock> = blocks
            .iter()
            .filter(|b| {
                b.metadata
                    .get("entity")
                    .and_then(|v| v.as_str())
                    .map(|e| e.to_lowercase() == needle)
                    .unwrap_or(false)
            })
            .map(|b| ScoredBlock {
                block_id: b.block_id.clone(),
                text: b.text.clone(),
                score: 1.0,
                metadata: b.metadata.clone(),
            })
            .collect();
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str, text: &str, embedding: Vec<f32>) -> IndexedBlock {
        IndexedBlock {
            block_id: id.to_string(),
            text: text.to_string(),
            embedding,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.5, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_truncates() {
        let index = InMemoryVectorIndex::new();
        index.insert("co", "conversations", block("far", "far", vec![0.0, 1.0]));
        index.insert("co", "conversations", block("near", "near", vec![1.0, 0.1]));
        index.insert("co", "conversations", block("mid", "mid", vec![0.7, 0.7]));

        let hits = index
            .search("co", "conversations", &[1.0, 0.0], 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].block_id, "near");
        assert_eq!(hits[1].block_id, "mid");
    }

    #[tokio::test]
    async fn search_is_scoped_by_company_and_source() {
        let index = InMemoryVectorIndex::new();
        index.insert("co-a", "conversations", block("a", "a", vec![1.0]));

        let other_company = index.search("co-b", "conversations", &[1.0], 5).await.unwrap();
        assert!(other_company.is_empty());
        let other_source = index.search("co-a", "reviews", &[1.0], 5).await.unwrap();
        assert!(other_source.is_empty());
    }

    #[tokio::test]
    async fn entity_lookup_matches_metadata_case_insensitively() {
        let index = InMemoryVectorIndex::new();
        let mut b = block("1", "chat with Ali", vec![1.0]);
        b.metadata = serde_json::json!({ "entity": "Ali Raza" });
        index.insert("co", "conversations", b);

        let hits = index
            .lookup_entity("co", "conversations", "ali raza", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].block_id, "1");
    }
}
