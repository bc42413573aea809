//! A query-in, documents-out view of a pipeline collection.

use std::fmt;
use std::sync::Arc;

use crate::document::{Document, SearchResult};
use crate::error::Result;
use crate::pipeline::RagPipeline;

/// Which search a [`Retriever`] runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchType {
    /// Plain nearest-neighbour search.
    Similarity,
    /// Maximal marginal relevance over `fetch_k` candidates.
    Mmr {
        /// Candidates fetched before re-ranking.
        fetch_k: usize,
        /// Relevance/diversity balance in `[0, 1]`.
        lambda_mult: f32,
    },
}

/// Retrieves documents from one collection of a [`RagPipeline`].
///
/// Created with [`RagPipeline::as_retriever`].
///
/// # Example
///
/// ```rust,ignore
/// let retriever = pipeline.as_retriever("NQNews").with_k(2);
/// for doc in retriever.retrieve("What are the latest financial news?").await? {
///     println!("{}", doc.text);
/// }
/// ```
#[derive(Clone)]
pub struct Retriever {
    pipeline: Arc<RagPipeline>,
    collection: String,
    search_type: SearchType,
    k: usize,
}

impl Retriever {
    /// A similarity retriever returning the pipeline's configured `top_k`.
    pub fn new(pipeline: Arc<RagPipeline>, collection: impl Into<String>) -> Self {
        let k = pipeline.config().top_k;
        Self { pipeline, collection: collection.into(), search_type: SearchType::Similarity, k }
    }

    /// Change the search type.
    pub fn with_search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    /// Use maximal marginal relevance with the pipeline's configured defaults.
    pub fn with_mmr(self) -> Self {
        let config = self.pipeline.config();
        let search_type =
            SearchType::Mmr { fetch_k: config.fetch_k, lambda_mult: config.lambda_mult };
        self.with_search_type(search_type)
    }

    /// Change the number of results.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// The collection searched.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The search type used.
    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    /// Results with their distances, nearest (or first selected) first.
    pub async fn retrieve_with_scores(&self, query: &str) -> Result<Vec<SearchResult>> {
        match self.search_type {
            SearchType::Similarity => {
                self.pipeline.similarity_search(&self.collection, query, self.k).await
            }
            SearchType::Mmr { fetch_k, lambda_mult } => {
                self.pipeline
                    .max_marginal_relevance_search(
                        &self.collection,
                        query,
                        self.k,
                        fetch_k,
                        lambda_mult,
                    )
                    .await
            }
        }
    }

    /// Matching chunks as documents, without scores.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let results = self.retrieve_with_scores(query).await?;
        Ok(results.into_iter().map(|r| r.chunk.into_document()).collect())
    }
}

impl fmt::Display for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.search_type {
            SearchType::Similarity => {
                write!(f, "Retriever(collection={}, search=similarity, k={})", self.collection, self.k)
            }
            SearchType::Mmr { fetch_k, lambda_mult } => write!(
                f,
                "Retriever(collection={}, search=mmr, k={}, fetch_k={fetch_k}, lambda_mult={lambda_mult})",
                self.collection, self.k
            ),
        }
    }
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retriever")
            .field("collection", &self.collection)
            .field("search_type", &self.search_type)
            .field("k", &self.k)
            .finish_non_exhaustive()
    }
}
