//! In-memory vector store.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency vector store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and offline runs of the pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{DistanceMetric, VectorStore};

/// Records of one collection, kept in insertion order.
#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    records: Vec<Chunk>,
    /// Chunk id → position in `records`.
    positions: HashMap<String, usize>,
}

impl Collection {
    fn new(dimensions: usize) -> Self {
        Self { dimensions, ..Self::default() }
    }

    fn remove(&mut self, id: &str) {
        if let Some(pos) = self.positions.remove(id) {
            self.records.remove(pos);
            for slot in self.positions.values_mut() {
                if *slot > pos {
                    *slot -= 1;
                }
            }
        }
    }
}

/// An in-memory vector store.
///
/// Collections are stored as a map from collection name to an
/// insertion-ordered list of chunks. Scores are distances under the
/// configured [`DistanceMetric`] (cosine by default), lower is closer.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use pgrag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 1536).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    metric: DistanceMetric,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store using cosine distance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// The distance metric used for scoring.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection =
            collections.entry(name.to_string()).or_insert_with(|| Collection::new(dimensions));
        if collection.dimensions != dimensions {
            return Err(RagError::SchemaError {
                collection: name.to_string(),
                expected: collection.dimensions,
                actual: dimensions,
            });
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.dimensions))
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != store.dimensions) {
            return Err(RagError::SchemaError {
                collection: collection.to_string(),
                expected: store.dimensions,
                actual: bad.embedding.len(),
            });
        }

        for chunk in chunks {
            match store.positions.get(&chunk.id) {
                Some(&pos) => store.records[pos] = chunk.clone(),
                None => {
                    store.positions.insert(chunk.id.clone(), store.records.len());
                    store.records.push(chunk.clone());
                }
            }
        }
        debug!(collection, count = chunks.len(), "upserted chunks in memory");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if store.records.is_empty() {
            return Err(RagError::EmptyCollection(collection.to_string()));
        }
        if embedding.len() != store.dimensions {
            return Err(RagError::SchemaError {
                collection: collection.to_string(),
                expected: store.dimensions,
                actual: embedding.len(),
            });
        }

        let mut scored: Vec<SearchResult> = store
            .records
            .iter()
            .map(|chunk| {
                let score = self.metric.distance(&chunk.embedding, embedding);
                SearchResult { chunk: chunk.clone(), score }
            })
            .collect();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| a.score.total_cmp(&b.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}
