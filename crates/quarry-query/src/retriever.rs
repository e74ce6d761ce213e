//! Retrieval: vector search, stale filtering, dedup, lexical rerank.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_index::vector_index::{ChunkHit, VectorIndex};

use crate::error::Result;
use crate::rerank::{containment, tokenize};

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// How many sources a query returns (default: 5).
    pub top_k: usize,
    /// Search depth multiplier so dedup and filtering still leave enough
    /// candidates (default: 4).
    pub fan_out: usize,
    pub vector_weight: f32,
    pub title_weight: f32,
    pub content_weight: f32,
    /// When false, chunks from stale-labelled documents are dropped.
    pub include_stale: bool,
    /// Case-insensitive markers that disqualify a hit when found in its
    /// title or text, for sources that flag old pages inline.
    pub stale_markers: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            fan_out: 4,
            vector_weight: 0.7,
            title_weight: 0.2,
            content_weight: 0.1,
            include_stale: false,
            stale_markers: vec!["[outdated]".into(), "[deprecated]".into()],
        }
    }
}

/// A deduplicated hit with its combined relevance score.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub hit: ChunkHit,
    pub score: f32,
}

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    #[must_use]
    pub fn new(index: Arc<dyn VectorIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    /// Retrieve the best-matching chunks for an embedded question.
    ///
    /// At most one chunk per source document survives, the one with the
    /// highest raw vector score. Survivors are reranked by a weighted blend
    /// of vector score and lexical overlap with the question.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Index` if the vector search fails.
    pub async fn retrieve(
        &self,
        query_vector: Vec<f32>,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RankedHit>> {
        let top_k = top_k.unwrap_or(self.config.top_k).max(1);
        let search_k = (top_k * self.config.fan_out).max(top_k);

        let hits = self
            .index
            .search(query_vector, u64::try_from(search_k).unwrap_or(u64::MAX))
            .await?;
        let candidates = hits.len();

        // Best chunk per parent, by raw vector score.
        let mut best: HashMap<String, ChunkHit> = HashMap::new();
        for hit in hits {
            if hit.stale && !self.config.include_stale {
                continue;
            }
            if self.is_marked_stale(&hit.title) || self.is_marked_stale(&hit.text) {
                continue;
            }
            match best.get(&hit.parent_id) {
                Some(existing) if existing.score >= hit.score => {}
                _ => {
                    best.insert(hit.parent_id.clone(), hit);
                }
            }
        }

        let query_tokens = tokenize(question);
        let mut ranked: Vec<RankedHit> = best
            .into_values()
            .map(|hit| {
                let score = self.config.vector_weight * hit.score
                    + self.config.title_weight * containment(&query_tokens, &hit.title)
                    + self.config.content_weight * containment(&query_tokens, &hit.text);
                RankedHit { hit, score }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);

        tracing::debug!(
            candidates,
            returned = ranked.len(),
            top_k,
            "retrieval complete"
        );
        Ok(ranked)
    }

    fn is_marked_stale(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.config
            .stale_markers
            .iter()
            .any(|marker| text.contains(&marker.to_lowercase()))
    }
}
