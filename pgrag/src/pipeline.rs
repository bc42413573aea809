//! Split, embed, store and search, wired together.
//!
//! ```rust,ignore
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .chunker(Arc::new(FixedSizeChunker::new(1000, 0)?))
//!     .build()?;
//!
//! pipeline.upsert_collection("NQNews", &documents, false).await?;
//! let results = pipeline.similarity_search("NQNews", "latest financial news", 4).await?;
//! ```

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error, info};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retriever::Retriever;
use crate::vectorstore::VectorStore;

/// Ingests documents into named collections and answers queries against them.
///
/// Writes go chunker, then embedder, then store; reads embed the query and
/// search. Failures are logged and returned as they were raised.
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
}

impl RagPipeline {
    /// Start building a pipeline.
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Chunking, search and embedding settings.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The embedder used for both chunks and queries.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// The store holding every collection this pipeline writes.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Create `name` sized for the embedder's vectors. Existing collections
    /// of that size are left alone.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        self.vector_store.create_collection(name, dimensions).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to create collection");
        })
    }

    /// Delete a named collection from the vector store. No-op if absent.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.vector_store.delete_collection(name).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to delete collection");
        })
    }

    /// Split documents into chunks with the configured [`Chunker`].
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks = self.chunker.split_documents(documents);
        debug!(document_count = documents.len(), chunk_count = chunks.len(), "split documents");
        chunks
    }

    /// Attach an embedding to every chunk.
    ///
    /// Texts are sent in batches of `embedding_batch_size`, with up to
    /// `embedding_concurrency` batches in flight. Vectors are reassembled in
    /// chunk order regardless of completion order.
    ///
    /// # Errors
    ///
    /// Propagates provider errors. Returns [`RagError::PipelineError`] if the
    /// provider returns a different number of vectors than it was given texts.
    pub async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let provider = &self.embedding_provider;
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(self.config.embedding_batch_size))
            .map(|batch| async move {
                let vectors = provider.embed_batch(batch).await?;
                if vectors.len() != batch.len() {
                    return Err(RagError::PipelineError(format!(
                        "embedding provider returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    )));
                }
                Ok(vectors)
            })
            .buffered(self.config.embedding_concurrency)
            .try_collect()
            .await
            .inspect_err(|e| error!(error = %e, "embedding failed"))?;

        for (chunk, embedding) in chunks.iter_mut().zip(batches.into_iter().flatten()) {
            chunk.embedding = embedding;
        }
        debug!(chunk_count = chunks.len(), "embedded chunks");
        Ok(())
    }

    async fn split_and_embed(&self, documents: &[Document]) -> Result<Vec<Chunk>> {
        let mut chunks = self.split_documents(documents);
        self.embed_chunks(&mut chunks).await?;
        Ok(chunks)
    }

    /// Write `documents` as the contents of collection `name`.
    ///
    /// Documents are split and embedded first. With `pre_delete`, an existing
    /// collection of that name is then dropped so later reads see only these
    /// documents; otherwise they are added to whatever is stored. The
    /// collection is created if absent.
    ///
    /// Returns the stored chunks with their embeddings.
    pub async fn upsert_collection(
        &self,
        name: &str,
        documents: &[Document],
        pre_delete: bool,
    ) -> Result<Vec<Chunk>> {
        let chunks = self.split_and_embed(documents).await?;
        let dimensions = self.embedding_provider.dimensions();

        self.vector_store
            .upsert_collection(name, dimensions, &chunks, pre_delete)
            .await
            .inspect_err(|e| error!(collection = name, error = %e, "collection upsert failed"))?;

        info!(collection = name, chunk_count = chunks.len(), pre_delete, "upserted collection");
        Ok(chunks)
    }

    /// Embed and insert documents without deleting anything already stored.
    ///
    /// The collection is created if absent. Returns the stored chunks.
    pub async fn add_documents(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<Vec<Chunk>> {
        let chunks = self.split_and_embed(documents).await?;

        self.create_collection(collection).await?;
        self.vector_store
            .upsert(collection, &chunks)
            .await
            .inspect_err(|e| error!(collection, error = %e, "upsert failed while adding documents"))?;

        info!(collection, chunk_count = chunks.len(), "added documents");
        Ok(chunks)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedding_provider
            .embed(query)
            .await
            .inspect_err(|e| error!(error = %e, "embedding failed during query"))
    }

    /// The `k` stored chunks closest to `query`, nearest first, with distances.
    pub async fn similarity_search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embed_query(query).await?;
        self.similarity_search_by_vector(collection, &query_embedding, k).await
    }

    /// The `k` stored chunks closest to an already computed query vector.
    pub async fn similarity_search_by_vector(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let results = self
            .vector_store
            .search(collection, embedding, k)
            .await
            .inspect_err(|e| error!(collection, error = %e, "vector store search failed"))?;
        info!(collection, result_count = results.len(), "similarity search completed");
        Ok(results)
    }

    /// Maximal marginal relevance search for `query`.
    ///
    /// See [`VectorStore::max_marginal_relevance_search`].
    pub async fn max_marginal_relevance_search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        fetch_k: usize,
        lambda_mult: f32,
    ) -> Result<Vec<SearchResult>> {
        crate::mmr::validate_lambda(lambda_mult)?;
        let query_embedding = self.embed_query(query).await?;
        let results = self
            .vector_store
            .max_marginal_relevance_search(collection, &query_embedding, k, fetch_k, lambda_mult)
            .await
            .inspect_err(|e| error!(collection, error = %e, "mmr search failed"))?;
        info!(collection, result_count = results.len(), fetch_k, lambda_mult, "mmr search completed");
        Ok(results)
    }

    /// Search with the configured `top_k`, dropping results farther than
    /// `score_threshold` when one is set.
    pub async fn query(&self, collection: &str, query: &str) -> Result<Vec<SearchResult>> {
        let results = self.similarity_search(collection, query, self.config.top_k).await?;
        let filtered: Vec<SearchResult> = match self.config.score_threshold {
            Some(threshold) => results.into_iter().filter(|r| r.score <= threshold).collect(),
            None => results,
        };
        info!(result_count = filtered.len(), "query completed");
        Ok(filtered)
    }

    /// A [`Retriever`] over `collection` using plain similarity search and
    /// the configured `top_k`.
    pub fn as_retriever(self: &Arc<Self>, collection: impl Into<String>) -> Retriever {
        Retriever::new(Arc::clone(self), collection)
    }
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("dimensions", &self.embedding_provider.dimensions())
            .finish_non_exhaustive()
    }
}

/// Collects the parts of a [`RagPipeline`]. Every part is required.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Chunking, search and embedding settings, validated by [`build`](Self::build).
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// The embedder; its [`dimensions`](EmbeddingProvider::dimensions) size new collections.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// The store backend, in-memory or pgvector.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// The splitter applied to documents before embedding.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// # Errors
    ///
    /// [`RagError::ConfigError`] naming the first missing part, or the
    /// configuration's own validation failure.
    pub fn build(self) -> Result<RagPipeline> {
        let config = required(self.config, "config")?;
        config.validate()?;
        Ok(RagPipeline {
            config,
            embedding_provider: required(self.embedding_provider, "embedding_provider")?,
            vector_store: required(self.vector_store, "vector_store")?,
            chunker: required(self.chunker, "chunker")?,
        })
    }
}

fn required<T>(part: Option<T>, name: &str) -> Result<T> {
    part.ok_or_else(|| RagError::ConfigError(format!("{name} is required")))
}
