//! Configuration for the RAG pipeline and the PostgreSQL connection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::mmr::{self, DEFAULT_FETCH_K, DEFAULT_LAMBDA_MULT};

/// Collection used when none is given.
pub const DEFAULT_COLLECTION_NAME: &str = "NQNews";

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results to return from a search.
    pub top_k: usize,
    /// Number of candidates fetched before maximal marginal relevance re-ranking.
    pub fetch_k: usize,
    /// Relevance/diversity balance for maximal marginal relevance, in `[0, 1]`.
    pub lambda_mult: f32,
    /// Maximum distance for [`RagPipeline::query`](crate::RagPipeline::query)
    /// results; farther results are dropped. `None` keeps everything.
    pub score_threshold: Option<f32>,
    /// Number of texts sent to the embedding provider per request.
    pub embedding_batch_size: usize,
    /// Number of embedding requests allowed in flight at once.
    pub embedding_concurrency: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
            top_k: 4,
            fetch_k: DEFAULT_FETCH_K,
            lambda_mult: DEFAULT_LAMBDA_MULT,
            score_threshold: None,
            embedding_batch_size: 64,
            embedding_concurrency: 1,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `fetch_k < top_k`
    /// - `lambda_mult` is outside `[0, 1]`
    /// - `embedding_batch_size == 0` or `embedding_concurrency == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.fetch_k < self.top_k {
            return Err(RagError::ConfigError(format!(
                "fetch_k ({}) must be at least top_k ({})",
                self.fetch_k, self.top_k
            )));
        }
        mmr::validate_lambda(self.lambda_mult)?;
        if self.embedding_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.embedding_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embedding_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of results to return from a search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the number of candidates fetched for maximal marginal relevance.
    pub fn fetch_k(mut self, k: usize) -> Self {
        self.config.fetch_k = k;
        self
    }

    /// Set the relevance/diversity balance for maximal marginal relevance.
    pub fn lambda_mult(mut self, lambda: f32) -> Self {
        self.config.lambda_mult = lambda;
        self
    }

    /// Drop query results farther than `threshold`.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.score_threshold = Some(threshold);
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the number of embedding requests in flight at once.
    pub fn embedding_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedding_concurrency = concurrency;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Where to find the PostgreSQL database holding the vectors.
///
/// Either discrete fields or an opaque connection string. When
/// `connection_string` is set it wins over the fields.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgConnectionConfig {
    /// Client driver name, kept for the rendered connection string (`psycopg2`).
    pub driver: String,
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Role name.
    pub user: String,
    /// Role password.
    pub password: String,
    /// Opaque connection string, e.g. `postgresql+psycopg2://user@localhost:5432/rag_app`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

impl Default for PgConnectionConfig {
    fn default() -> Self {
        Self {
            driver: "psycopg2".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            connection_string: None,
        }
    }
}

impl fmt::Debug for PgConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnectionConfig").field("target", &self.redacted()).finish()
    }
}

impl PgConnectionConfig {
    /// Use an opaque connection string.
    pub fn from_connection_string(connection_string: impl Into<String>) -> Self {
        Self { connection_string: Some(connection_string.into()), ..Self::default() }
    }

    /// Read the connection from the environment.
    ///
    /// `PGVECTOR_CONNECTION_STRING` is used when set. Otherwise each field
    /// comes from `PGVECTOR_DRIVER`, `PGVECTOR_HOST`, `PGVECTOR_PORT`,
    /// `PGVECTOR_DATABASE`, `PGVECTOR_USER` and `PGVECTOR_PASSWORD`, falling
    /// back to the [`Default`] values.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `PGVECTOR_PORT` is not a port number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup("PGVECTOR_CONNECTION_STRING").filter(|s| !s.trim().is_empty()) {
            return Ok(Self::from_connection_string(url));
        }

        let defaults = Self::default();
        let port = match lookup("PGVECTOR_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                RagError::ConfigError(format!("PGVECTOR_PORT '{raw}' is not a valid port: {e}"))
            })?,
            None => defaults.port,
        };

        Ok(Self {
            driver: lookup("PGVECTOR_DRIVER").unwrap_or(defaults.driver),
            host: lookup("PGVECTOR_HOST").unwrap_or(defaults.host),
            port,
            database: lookup("PGVECTOR_DATABASE").unwrap_or(defaults.database),
            user: lookup("PGVECTOR_USER").unwrap_or(defaults.user),
            password: lookup("PGVECTOR_PASSWORD").unwrap_or(defaults.password),
            connection_string: None,
        })
    }

    /// Check that the descriptor names a reachable-looking target.
    pub fn validate(&self) -> Result<()> {
        match &self.connection_string {
            Some(url) => {
                let scheme = url.split("://").next().unwrap_or_default();
                if !url.contains("://") || !scheme.starts_with("postgres") {
                    return Err(RagError::ConfigError(format!(
                        "connection string must use a postgres:// or postgresql:// scheme, got '{scheme}'"
                    )));
                }
            }
            None => {
                if self.host.trim().is_empty() || self.database.trim().is_empty() {
                    return Err(RagError::ConfigError(
                        "database host and name must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Render the descriptor as `postgresql+<driver>://user:password@host:port/database`.
    pub fn connection_string(&self) -> String {
        match &self.connection_string {
            Some(url) => url.clone(),
            None => format!(
                "postgresql+{}://{}:{}@{}:{}/{}",
                self.driver, self.user, self.password, self.host, self.port, self.database
            ),
        }
    }

    /// The opaque connection string with any `+driver` suffix removed from the
    /// scheme, ready for the Rust client. `None` when discrete fields are used.
    pub fn url(&self) -> Option<String> {
        self.connection_string.as_deref().map(strip_driver)
    }

    /// The connection string with the password masked, safe for logs.
    pub fn redacted(&self) -> String {
        match &self.connection_string {
            Some(url) => redact_url(url),
            None => format!(
                "postgresql+{}://{}:***@{}:{}/{}",
                self.driver, self.user, self.host, self.port, self.database
            ),
        }
    }
}

/// `postgresql+psycopg2://...` becomes `postgresql://...`.
fn strip_driver(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let base = scheme.split('+').next().unwrap_or(scheme);
            format!("{base}://{rest}")
        }
        None => url.to_string(),
    }
}

fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
