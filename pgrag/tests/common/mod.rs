//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pgrag::{
    EmbeddingProvider, FixedSizeChunker, InMemoryVectorStore, RagConfig, RagError, RagPipeline,
    Result,
};

/// Deterministic hash-based embeddings: equal texts get equal vectors,
/// different texts point in unrelated directions.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

pub fn mock_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let mut emb = vec![0.0f32; dimensions];
    for (i, v) in emb.iter_mut().enumerate() {
        // Mix the component index in before narrowing, or large hashes lose it.
        let mixed = (hash ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)) % 100_003;
        *v = (mixed as f32).sin();
    }
    let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        emb.iter_mut().for_each(|x| *x /= norm);
    }
    emb
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(mock_embedding(text, self.dimensions))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Counts batch calls and finishes earlier batches last, to expose any
/// reordering when batches run concurrently.
pub struct SlowFirstBatchProvider {
    inner: MockEmbeddingProvider,
    pub batch_calls: AtomicUsize,
}

impl SlowFirstBatchProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { inner: MockEmbeddingProvider::new(dimensions), batch_calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowFirstBatchProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = 50u64.saturating_sub(call as u64 * 10);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.inner.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }
}

/// Always throttled.
pub struct ThrottledProvider;

#[async_trait]
impl EmbeddingProvider for ThrottledProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::RateLimitError { provider: "mock".into(), message: "429".into() })
    }

    fn dimensions(&self) -> usize {
        8
    }
}

pub const DIM: usize = 64;

pub fn pipeline_with(
    config: RagConfig,
    provider: Arc<dyn EmbeddingProvider>,
) -> Arc<RagPipeline> {
    let chunker = FixedSizeChunker::new(config.chunk_size, config.chunk_overlap).unwrap();
    Arc::new(
        RagPipeline::builder()
            .config(config)
            .embedding_provider(provider)
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .chunker(Arc::new(chunker))
            .build()
            .unwrap(),
    )
}

pub fn mock_pipeline(chunk_size: usize, chunk_overlap: usize) -> Arc<RagPipeline> {
    let config =
        RagConfig::builder().chunk_size(chunk_size).chunk_overlap(chunk_overlap).build().unwrap();
    pipeline_with(config, Arc::new(MockEmbeddingProvider::new(DIM)))
}
