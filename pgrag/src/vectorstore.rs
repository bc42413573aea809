//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Chunk, SearchResult};
use crate::error::Result;
use crate::mmr;

/// How the distance between two vectors is measured.
///
/// Every metric is reported as a distance: lower scores are closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in `[0, 2]`. pgvector operator `<=>`.
    #[default]
    Cosine,
    /// Euclidean (L2) distance. pgvector operator `<->`.
    Euclidean,
    /// Negative inner product. pgvector operator `<#>`.
    InnerProduct,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length under this metric.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::Euclidean => {
                a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
            Self::InnerProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }

    /// The pgvector SQL operator computing this distance.
    pub fn operator(self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::Euclidean => "<->",
            Self::InnerProduct => "<#>",
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`Chunk`]s. A collection
/// remembers the dimensionality it was created with and rejects vectors of
/// any other length with [`RagError::SchemaError`](crate::RagError::SchemaError).
///
/// Searching a collection that does not exist fails with
/// [`RagError::CollectionNotFound`](crate::RagError::CollectionNotFound);
/// searching one that exists but is empty fails with
/// [`RagError::EmptyCollection`](crate::RagError::EmptyCollection).
///
/// # Example
///
/// ```rust,ignore
/// use pgrag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 1536).await?;
/// store.upsert("docs", &chunks).await?;
/// let results = store.search("docs", &query_embedding, 4).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection.
    ///
    /// No-op if it already exists with the same dimensionality; fails with a
    /// schema error if it exists with a different one.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Dimensionality of the named collection, or `None` if it does not exist.
    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>>;

    /// Upsert chunks into a collection. Chunks must have embeddings set.
    ///
    /// A chunk whose id is already stored replaces the stored record and keeps
    /// its original insertion position.
    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()>;

    /// Delete chunks by their IDs from a collection.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// Search for the `top_k` records closest to the given embedding.
    ///
    /// Returns results ordered by non-decreasing distance, ties broken by
    /// insertion order. Each result carries its stored embedding.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Write a whole collection in one call.
    ///
    /// With `pre_delete`, any existing collection of that name is dropped
    /// first, so a later read sees only these chunks. The collection is then
    /// created if absent and the chunks are upserted. A failure part way
    /// through leaves whatever was already written.
    async fn upsert_collection(
        &self,
        name: &str,
        dimensions: usize,
        chunks: &[Chunk],
        pre_delete: bool,
    ) -> Result<()> {
        if pre_delete {
            debug!(collection = name, "pre-deleting collection");
            self.delete_collection(name).await?;
        }
        self.create_collection(name, dimensions).await?;
        self.upsert(name, chunks).await
    }

    /// Maximal marginal relevance search.
    ///
    /// Fetches the `fetch_k` nearest records, then greedily picks `k` of them
    /// balancing relevance to the query against similarity to the records
    /// already picked. `lambda_mult = 1` gives plain nearest-neighbour order,
    /// `lambda_mult = 0` maximizes diversity. Scores are the original distances.
    async fn max_marginal_relevance_search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        fetch_k: usize,
        lambda_mult: f32,
    ) -> Result<Vec<SearchResult>> {
        mmr::validate_lambda(lambda_mult)?;
        let candidates = self.search(collection, embedding, fetch_k.max(k)).await?;
        Ok(mmr::select(embedding, candidates, k, lambda_mult))
    }
}
