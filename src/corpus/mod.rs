//! Knowledge corpus indexing
//!
//! Loads the knowledge text once per process, splits it into overlapping word windows and
//! embeds every window in a single batch. The resulting [`CorpusIndex`] is immutable.

mod chunker;

pub use chunker::split_into_chunks;

use crate::config::{EmbeddingConfig, KnowledgeConfig};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::error::{GroundchatError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// One embedded window of the knowledge text
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position-derived id (`c0`, `c1`, ...)
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Ordered, immutable set of chunks from one index build
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    chunks: Vec<Chunk>,
    dimension: usize,
    source_digest: Option<String>,
}

impl CorpusIndex {
    /// Index with no chunks; retrieval against it finds nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assemble an index from chunk texts and their embeddings (same order)
    pub fn from_embeddings(
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        source_digest: Option<String>,
    ) -> std::result::Result<Self, EmbeddingError> {
        if texts.len() != embeddings.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let chunks = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| Chunk {
                id: format!("c{}", i),
                text,
                embedding,
            })
            .collect();

        Ok(Self {
            chunks,
            dimension,
            source_digest,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding dimension shared by every chunk (0 when empty)
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// BLAKE3 digest of the source text the index was built from
    pub fn source_digest(&self) -> Option<&str> {
        self.source_digest.as_deref()
    }
}

/// Builds the corpus index at most once per process
///
/// Concurrent first callers of [`CorpusIndexer::ensure_index`] wait on the same build. A failed
/// build stores nothing, so the next call tries again.
pub struct CorpusIndexer {
    source: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    provider: Arc<dyn EmbeddingProvider>,
    embed_timeout: Duration,
    index: OnceCell<Arc<CorpusIndex>>,
}

impl CorpusIndexer {
    pub fn new(
        source: PathBuf,
        chunk_size: usize,
        chunk_overlap: usize,
        provider: Arc<dyn EmbeddingProvider>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            source,
            chunk_size,
            chunk_overlap,
            provider,
            embed_timeout,
            index: OnceCell::new(),
        }
    }

    pub fn from_config(
        knowledge: &KnowledgeConfig,
        embedding: &EmbeddingConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(
            crate::config::expand_tilde(&knowledge.source),
            knowledge.chunk_size,
            knowledge.chunk_overlap,
            provider,
            Duration::from_secs(embedding.timeout_secs),
        )
    }

    /// Return the index, building it on first use
    pub async fn ensure_index(&self) -> Result<Arc<CorpusIndex>> {
        let index = self.index.get_or_try_init(|| self.build()).await?;
        Ok(Arc::clone(index))
    }

    /// The index if a build has already completed
    pub fn current(&self) -> Option<Arc<CorpusIndex>> {
        self.index.get().cloned()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    async fn build(&self) -> Result<Arc<CorpusIndex>> {
        let start = Instant::now();

        let content = match tokio::fs::read_to_string(&self.source).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Knowledge source {:?} not found, retrieval disabled",
                    self.source
                );
                return Ok(Arc::new(CorpusIndex::empty()));
            }
            Err(e) => {
                return Err(GroundchatError::Io {
                    source: e,
                    context: format!("Failed to read knowledge source: {:?}", self.source),
                })
            }
        };

        if content.trim().is_empty() {
            info!("Knowledge source {:?} is empty", self.source);
            return Ok(Arc::new(CorpusIndex::empty()));
        }

        let digest = blake3::hash(content.as_bytes()).to_hex().to_string();
        let texts = split_into_chunks(&content, self.chunk_size, self.chunk_overlap);
        debug!("Split knowledge source into {} chunks", texts.len());

        let embeddings = tokio::time::timeout(self.embed_timeout, self.provider.embed_batch(&texts))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.embed_timeout.as_secs()))??;

        let index = CorpusIndex::from_embeddings(texts, embeddings, Some(digest))?;

        info!(
            "Built corpus index: {} chunks, {}D, model {} ({}ms)",
            index.len(),
            index.dimension(),
            self.provider.model_name(),
            start.elapsed().as_millis()
        );

        Ok(Arc::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(EmbeddingError::Request("service unavailable".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, 0.0])
                .collect())
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn indexer(source: PathBuf, provider: Arc<CountingEmbedder>) -> CorpusIndexer {
        CorpusIndexer::new(source, 10, 2, provider, Duration::from_secs(5))
    }

    fn write_source(dir: &TempDir, words: usize) -> PathBuf {
        let path = dir.path().join("knowledge.txt");
        let text = (0..words)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_builds_once() {
        let temp = TempDir::new().unwrap();
        let provider = CountingEmbedder::new(false);
        let indexer = indexer(write_source(&temp, 25), provider.clone());

        let first = indexer.ensure_index().await.unwrap();
        let second = indexer.ensure_index().await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 3);
        assert_eq!(first.dimension(), 3);
        let ids: Vec<&str> = first.chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
        assert_eq!(first.source_digest().map(str::len), Some(64));
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_coalesce() {
        let temp = TempDir::new().unwrap();
        let provider = CountingEmbedder::new(false);
        let indexer = indexer(write_source(&temp, 25), provider.clone());

        let (a, b, c) = tokio::join!(
            indexer.ensure_index(),
            indexer.ensure_index(),
            indexer.ensure_index()
        );

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(c.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_source_is_empty_index() {
        let temp = TempDir::new().unwrap();
        let provider = CountingEmbedder::new(false);
        let indexer = indexer(temp.path().join("absent.txt"), provider.clone());

        let index = indexer.ensure_index().await.unwrap();
        assert!(index.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_source_is_empty_index() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("knowledge.txt");
        std::fs::write(&path, "  \n\n ").unwrap();
        let provider = CountingEmbedder::new(false);

        let index = indexer(path, provider.clone()).ensure_index().await.unwrap();
        assert!(index.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_build_is_retried() {
        let temp = TempDir::new().unwrap();
        let provider = CountingEmbedder::new(true);
        let indexer = indexer(write_source(&temp, 25), provider.clone());

        assert!(indexer.ensure_index().await.is_err());
        assert!(indexer.current().is_none());
        assert!(indexer.ensure_index().await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_embeddings_rejects_mixed_dimensions() {
        let result = CorpusIndex::from_embeddings(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 0.0], vec![1.0]],
            None,
        );
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_from_embeddings_rejects_count_mismatch() {
        let result =
            CorpusIndex::from_embeddings(vec!["a".to_string()], Vec::new(), None);
        assert!(matches!(result, Err(EmbeddingError::CountMismatch { .. })));
    }
}
