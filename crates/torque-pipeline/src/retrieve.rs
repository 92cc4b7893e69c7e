//! Retrieval path: embed → vector search → rerank → context build.

use std::collections::HashSet;

use tracing::{debug, warn};

use torque_core::config::RetrievalConfig;
use torque_index::{ScoredBlock, VectorIndex};
use torque_llm::EmbeddingProvider;

/// Separator between corpus blocks in the assembled context window.
const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Weight of the vector score vs. lexical overlap in the rerank blend.
const VECTOR_WEIGHT: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct RetrievalOutput {
    pub context_text: String,
    /// Block ids included in the context, in order.
    pub citations: Vec<String>,
    /// True when the index had nothing; the generator must say so rather
    /// than answer from priors.
    pub empty: bool,
}

impl RetrievalOutput {
    fn empty() -> Self {
        Self {
            context_text: String::new(),
            citations: Vec::new(),
            empty: true,
        }
    }
}

/// Run the full retrieval path for an already-reformulated query.
///
/// Failures here never fail the request: an unreachable embedder or index
/// degrades to the empty-retrieval outcome.
pub async fn run(
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    query: &str,
    company_id: &str,
    source: &str,
    cfg: &RetrievalConfig,
) -> RetrievalOutput {
    let embedding = match embedder.embed(query).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "query embedding failed, retrieval degraded to empty");
            return RetrievalOutput::empty();
        }
    };

    let hits = match index
        .search(company_id, source, &embedding, cfg.top_k_retrieve)
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, "vector search failed, retrieval degraded to empty");
            return RetrievalOutput::empty();
        }
    };

    if hits.is_empty() {
        debug!(company_id, source, "vector search returned no blocks");
        return RetrievalOutput::empty();
    }

    let reranked = rerank(query, hits, cfg.top_k_rerank);
    build_context(&reranked, cfg.max_context_chars)
}

/// Cross-encoder seam. The shipped implementation blends the vector score
/// with lexical token overlap against the query; swap-in point for a real
/// cross-encoder service.
pub fn rerank(query: &str, mut blocks: Vec<ScoredBlock>, top_n: usize) -> Vec<ScoredBlock> {
    for b in &mut blocks {
        let overlap = lexical_overlap(query, &b.text);
        b.score = VECTOR_WEIGHT * b.score + (1.0 - VECTOR_WEIGHT) * overlap;
    }
    blocks.sort_by(|a, b| b.score.total_cmp(&a.score));
    blocks.truncate(top_n);
    blocks
}

/// Fraction of unique query tokens present in the block text.
fn lexical_overlap(query: &str, text: &str) -> f32 {
    let tokens = |s: &str| -> HashSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(String::from)
            .collect()
    };

    let q = tokens(query);
    if q.is_empty() {
        return 0.0;
    }
    let t = tokens(text);
    let shared = q.iter().filter(|w| t.contains(*w)).count();
    shared as f32 / q.len() as f32
}

/// Concatenate block texts into a bounded window, tracking citations.
pub(crate) fn build_context(blocks: &[ScoredBlock], max_chars: usize) -> RetrievalOutput {
    let mut context_text = String::new();
    let mut citations = Vec::new();

    for block in blocks {
        let addition = if context_text.is_empty() {
            block.text.len()
        } else {
            block.text.len() + BLOCK_SEPARATOR.len()
        };
        if context_text.len() + addition > max_chars && !context_text.is_empty() {
            break;
        }
        if !context_text.is_empty() {
            context_text.push_str(BLOCK_SEPARATOR);
        }
        context_text.push_str(&block.text);
        citations.push(block.block_id.clone());
    }

    RetrievalOutput {
        empty: context_text.is_empty(),
        context_text,
        citations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str, text: &str, score: f32) -> ScoredBlock {
        ScoredBlock {
            block_id: id.to_string(),
            text: text.to_string(),
            score,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn rerank_prefers_lexically_matching_blocks() {
        let blocks = vec![
            block("vague", "general chit chat about nothing relevant", 0.80),
            block("sharp", "Haval H6 transmission jerking second gear", 0.78),
        ];
        let ranked = rerank("Haval H6 transmission issues", blocks, 2);
        assert_eq!(ranked[0].block_id, "sharp");
    }

    #[test]
    fn rerank_truncates_to_top_n() {
        let blocks = (0..20)
            .map(|i| block(&format!("b{i}"), "text", 1.0 - i as f32 * 0.01))
            .collect();
        assert_eq!(rerank("q", blocks, 10).len(), 10);
    }

    #[test]
    fn context_is_bounded_and_cited_in_order() {
        let blocks = vec![
            block("a", &"x".repeat(50), 0.9),
            block("b", &"y".repeat(50), 0.8),
            block("c", &"z".repeat(50), 0.7),
        ];
        let out = build_context(&blocks, 120);
        assert_eq!(out.citations, vec!["a", "b"]); // "c" would overflow
        assert!(out.context_text.contains(BLOCK_SEPARATOR));
        assert!(!out.empty);
    }

    #[test]
    fn first_block_is_kept_even_when_oversized() {
        let blocks = vec![block("big", &"x".repeat(500), 0.9)];
        let out = build_context(&blocks, 100);
        assert_eq!(out.citations, vec!["big"]);
    }

    #[test]
    fn no_blocks_means_empty_output() {
        let out = build_context(&[], 1000);
        assert!(out.empty);
        assert!(out.citations.is_empty());
    }
}
