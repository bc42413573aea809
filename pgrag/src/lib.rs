//! # pgrag
//!
//! Document chunking, embedding and vector similarity search over PostgreSQL
//! with the pgvector extension.
//!
//! ## Overview
//!
//! A run loads text files into [`Document`]s, splits them with a
//! [`Chunker`], embeds the chunks through an [`EmbeddingProvider`] and stores
//! them in a named collection of a [`VectorStore`]. Queries are embedded the
//! same way and answered by nearest-neighbour search or by maximal marginal
//! relevance re-ranking. [`RagPipeline`] wires the pieces together.
//!
//! Scores are distances: lower is closer. See [`DistanceMetric`].
//!
//! ## Backends
//!
//! - [`InMemoryVectorStore`] - always available, for tests and offline runs
//! - `pgvector::PgVectorStore` - PostgreSQL + pgvector (feature `pgvector`)
//! - `openai::OpenAIEmbeddingProvider` - OpenAI embeddings API (feature `openai`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pgrag::{
//!     DocumentLoader, FixedSizeChunker, InMemoryVectorStore, RagConfig, RagPipeline, TextLoader,
//! };
//! use pgrag::openai::OpenAIEmbeddingProvider;
//!
//! let config = RagConfig::default();
//! let pipeline = Arc::new(
//!     RagPipeline::builder()
//!         .chunker(Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?))
//!         .config(config)
//!         .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!         .vector_store(Arc::new(InMemoryVectorStore::new()))
//!         .build()?,
//! );
//!
//! let documents = TextLoader::new("finance_blog_samples.csv").load().await?;
//! pipeline.upsert_collection("NQNews", &documents, false).await?;
//! let hits = pipeline.similarity_search("NQNews", "What are the latest financial news?", 4).await?;
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod loader;
pub mod mmr;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pgvector")]
pub mod pgvector;
pub mod pipeline;
pub mod retriever;
pub mod retry;
pub mod vectorstore;

pub use chunking::{Chunker, FixedSizeChunker};
pub use config::{DEFAULT_COLLECTION_NAME, PgConnectionConfig, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, Metadata, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use loader::{DocumentLoader, LoadPolicy, TextLoader};
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
#[cfg(feature = "pgvector")]
pub use pgvector::PgVectorStore;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use retriever::{Retriever, SearchType};
pub use retry::RetryPolicy;
pub use vectorstore::{DistanceMetric, VectorStore};
