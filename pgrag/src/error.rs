//! Error types for the `pgrag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The input path does not exist.
    #[error("Input not found: {}", path.display())]
    NotFound {
        /// The path that was requested.
        path: PathBuf,
    },

    /// The input exists but could not be read or parsed as text.
    #[error("Failed to read {}: {message}", path.display())]
    ReadError {
        /// The path being read.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The embedding provider rejected or was not given credentials.
    #[error("Authentication error ({provider}): {message}")]
    AuthError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding provider throttled the request.
    #[error("Rate limited ({provider}): {message}")]
    RateLimitError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A connectivity failure, timeout or server-side error talking to the provider.
    #[error("Transient network error ({provider}): {message}")]
    TransientNetworkError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Any other error during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store backend could not be reached.
    #[error("Store connection error ({backend}): {message}")]
    StoreConnectionError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Vector dimensionality is inconsistent with the collection.
    #[error("Schema error in collection '{collection}': expected {expected} dimensions, got {actual}")]
    SchemaError {
        /// The collection being written or searched.
        collection: String,
        /// The dimensionality the collection was created with.
        expected: usize,
        /// The offending dimensionality.
        actual: usize,
    },

    /// The named collection does not exist.
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),

    /// The named collection exists but holds no records.
    #[error("Collection '{0}' is empty")]
    EmptyCollection(String),

    /// Any other error in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error in the RAG pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether the failed operation may succeed if attempted again.
    ///
    /// Only throttling and transient network failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitError { .. } | Self::TransientNetworkError { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
