//! Hybrid retrieval combining semantic similarity with lexical boosts

use crate::config::{AnchorRule, RetrievalConfig};
use crate::corpus::{CorpusIndex, CorpusIndexer};
use crate::embedding::{EmbeddingError, EmbeddingProvider, QueryEmbeddingCache};
use crate::error::Result;
use crate::retrieval::lexical::{matched_anchor_rules, LexicalBoost, QueryTerms};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cosine similarity; 0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// A chunk that survived filtering, with its score breakdown
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub chunk_id: String,
    pub text: String,
    pub semantic: f32,
    pub boost: LexicalBoost,
}

impl ScoredPassage {
    pub fn final_score(&self) -> f32 {
        self.semantic + self.boost.total()
    }
}

/// Score, filter and rank every chunk in `index` against a query embedding.
///
/// Chunks whose semantic score is below `min_similarity` or NaN are dropped regardless of lexical
/// boosts. Ties keep index order.
pub fn rank_chunks(
    index: &CorpusIndex,
    query_embedding: &[f32],
    terms: &QueryTerms,
    config: &RetrievalConfig,
    k: usize,
    min_similarity: f32,
) -> Vec<ScoredPassage> {
    let mut scored: Vec<ScoredPassage> = index
        .chunks()
        .iter()
        .filter_map(|chunk| {
            let semantic = cosine_similarity(&chunk.embedding, query_embedding);
            if semantic.is_nan() || semantic < min_similarity {
                return None;
            }
            Some(ScoredPassage {
                chunk_id: chunk.id.clone(),
                text: chunk.text.clone(),
                semantic,
                boost: terms.boost(&chunk.text, config),
            })
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| {
        b.final_score()
            .partial_cmp(&a.final_score())
            .unwrap_or(Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

/// Retriever over the process-wide corpus index
pub struct HybridRetriever {
    indexer: Arc<CorpusIndexer>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: QueryEmbeddingCache,
    config: RetrievalConfig,
    embed_timeout: Duration,
}

impl HybridRetriever {
    pub fn new(
        indexer: Arc<CorpusIndexer>,
        provider: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        embed_timeout: Duration,
    ) -> Self {
        let cache = QueryEmbeddingCache::new(config.query_cache_capacity);
        Self {
            indexer,
            provider,
            cache,
            config,
            embed_timeout,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn indexer(&self) -> &Arc<CorpusIndexer> {
        &self.indexer
    }

    /// Top passages for `query` using the configured `top_k` and `min_similarity`
    pub async fn retrieve(&self, query: &str) -> Result<Vec<String>> {
        self.retrieve_with(query, self.config.top_k, self.config.min_similarity)
            .await
    }

    pub async fn retrieve_with(
        &self,
        query: &str,
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<String>> {
        let passages = self.retrieve_scored(query, k, min_similarity).await?;
        Ok(passages.into_iter().map(|p| p.text).collect())
    }

    /// Like [`HybridRetriever::retrieve_with`] but keeps the score breakdown
    pub async fn retrieve_scored(
        &self,
        query: &str,
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredPassage>> {
        let index = self.indexer.ensure_index().await?;
        let terms = QueryTerms::new(query, &self.config);
        if index.is_empty() || terms.is_blank() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.query_embedding(query).await?;
        if query_embedding.len() != index.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: index.dimension(),
                actual: query_embedding.len(),
            }
            .into());
        }

        let passages = rank_chunks(
            &index,
            &query_embedding,
            &terms,
            &self.config,
            k,
            min_similarity,
        );
        debug!(
            "Retrieved {} of {} chunks (k={}, min={})",
            passages.len(),
            index.len(),
            k,
            min_similarity
        );
        Ok(passages)
    }

    /// Retrieval that never fails; errors are logged and yield no passages
    pub async fn retrieve_or_empty(&self, query: &str) -> Vec<String> {
        match self.retrieve(query).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!("Retrieval failed, continuing without context: {}", e);
                Vec::new()
            }
        }
    }

    /// Anchor rules triggered by `query`
    pub fn matched_anchor_rules(&self, query: &str) -> Vec<AnchorRule> {
        matched_anchor_rules(query, &self.config.anchor_rules)
            .cloned()
            .collect()
    }

    /// Build the index ahead of the first query
    pub async fn warm(&self) -> Result<usize> {
        Ok(self.indexer.ensure_index().await?.len())
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(query).await {
            return Ok(hit);
        }

        let embedding = tokio::time::timeout(self.embed_timeout, self.provider.embed(query))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.embed_timeout.as_secs()))??;

        self.cache.insert(query.to_string(), embedding.clone()).await;
        Ok(embedding)
    }
}
