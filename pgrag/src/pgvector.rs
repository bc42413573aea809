//! Collections persisted in PostgreSQL through the
//! [pgvector](https://github.com/pgvector/pgvector) extension (feature `pgvector`).
//!
//! The server needs pgvector installed, and either a role allowed to run
//! `CREATE EXTENSION IF NOT EXISTS vector` or the extension already created.
//!
//! # Layout
//!
//! A registry table `pgrag_collection` maps each collection name to its table
//! and dimensionality, and every statement on a collection looks its table up
//! there. A collection without a registry row does not exist. Each collection
//! lives in its own table `pgrag_<sanitized name>_<hash>` with columns `seq`,
//! `id`, `text`, `embedding` (`vector(N)`), `metadata` (jsonb) and
//! `document_id`. `seq` records insertion order and breaks distance ties.
//!
//! # Example
//!
//! ```rust,ignore
//! use pgrag::pgvector::PgVectorStore;
//! use pgrag::PgConnectionConfig;
//!
//! let store = PgVectorStore::connect(&PgConnectionConfig::from_env()?).await?;
//! store.create_collection("NQNews", 1536).await?;
//! store.upsert("NQNews", &chunks).await?;
//! let results = store.search("NQNews", &query_embedding, 4).await?;
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::PgConnectionConfig;
use crate::document::{Chunk, Metadata, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{DistanceMetric, VectorStore};

const BACKEND: &str = "pgvector";
const REGISTRY_TABLE: &str = "pgrag_collection";
/// Characters of the sanitized name kept in a table name, leaving room for
/// the prefix and hash suffix under PostgreSQL's 63 byte identifier limit.
const TABLE_STEM_LEN: usize = 40;

/// A collection's row in the registry.
struct Registered {
    table_name: String,
    dimensions: usize,
}

/// A [`VectorStore`] backed by PostgreSQL with the pgvector extension.
///
/// Scores are distances under the configured [`DistanceMetric`] (cosine by
/// default), lower is closer.
pub struct PgVectorStore {
    pool: PgPool,
    metric: DistanceMetric,
    registry_ready: OnceCell<()>,
}

impl PgVectorStore {
    /// Connect using a [`PgConnectionConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an unparsable connection string
    /// and [`RagError::StoreConnectionError`] if the database is unreachable.
    pub async fn connect(config: &PgConnectionConfig) -> Result<Self> {
        let options = match config.url() {
            Some(url) => PgConnectOptions::from_str(&url).map_err(|e| {
                RagError::ConfigError(format!("invalid connection string: {e}"))
            })?,
            None => PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.user)
                .password(&config.password)
                .database(&config.database),
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| RagError::StoreConnectionError {
                backend: BACKEND.to_string(),
                message: e.to_string(),
            })?;

        info!(target_db = %config.redacted(), "connected to pgvector store");
        Ok(Self::from_pool(pool))
    }

    /// Wrap a pool the caller already configured.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool, metric: DistanceMetric::default(), registry_ready: OnceCell::new() }
    }

    /// Use a different distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    fn map_err(e: sqlx::Error) -> RagError {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => RagError::StoreConnectionError {
                backend: BACKEND.to_string(),
                message: e.to_string(),
            },
            _ => RagError::VectorStoreError { backend: BACKEND.to_string(), message: e.to_string() },
        }
    }

    /// `NQNews` becomes `pgrag_nqnews_<hash>`. The readable stem maps anything
    /// outside `[A-Za-z0-9_]` to `_` and folds case; the hash of the exact
    /// name keeps `NQNews`, `nqnews` and `nq-news` in separate tables.
    fn table_name(name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(RagError::ConfigError("collection name must not be empty".to_string()));
        }
        let stem: String = name
            .chars()
            .take(TABLE_STEM_LEN)
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_lowercase() } else { '_' })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        Ok(format!("pgrag_{stem}_{}", &hash[..12]))
    }

    async fn ensure_registry(&self) -> Result<()> {
        self.registry_ready
            .get_or_try_init(|| async {
                sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
                    .execute(&self.pool)
                    .await
                    .map_err(Self::map_err)?;

                let create_sql = format!(
                    "CREATE TABLE IF NOT EXISTS {REGISTRY_TABLE} (\
                        name TEXT PRIMARY KEY, \
                        table_name TEXT NOT NULL UNIQUE, \
                        dimensions INTEGER NOT NULL, \
                        created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
                    )"
                );
                sqlx::query(&create_sql).execute(&self.pool).await.map_err(Self::map_err)?;
                debug!(table = REGISTRY_TABLE, "collection registry ready");
                Ok::<(), RagError>(())
            })
            .await?;
        Ok(())
    }

    async fn registered(&self, name: &str) -> Result<Option<Registered>> {
        self.ensure_registry().await?;
        let sql = format!("SELECT table_name, dimensions FROM {REGISTRY_TABLE} WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_err)?;

        match row {
            Some(row) => {
                let table_name: String = row.try_get("table_name").map_err(Self::map_err)?;
                let dimensions: i32 = row.try_get("dimensions").map_err(Self::map_err)?;
                Ok(Some(Registered { table_name, dimensions: dimensions as usize }))
            }
            None => Ok(None),
        }
    }

    async fn require(&self, name: &str) -> Result<Registered> {
        self.registered(name).await?.ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }
}

/// Render a vector as a pgvector literal such as `[1,2.5,3]`.
fn format_vector(values: &[f32]) -> String {
    format!("[{}]", values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
}

/// Parse a pgvector text literal back into a vector.
fn parse_vector(literal: &str) -> Result<Vec<f32>> {
    let inner = literal.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|v| {
            v.trim().parse::<f32>().map_err(|e| RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!("invalid vector component '{v}': {e}"),
            })
        })
        .collect()
}

fn check_dimensions(collection: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::SchemaError { collection: collection.to_string(), expected, actual });
    }
    Ok(())
}

fn metadata_from_json(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(obj) => obj.into_iter().collect::<HashMap<_, _>>(),
        _ => Metadata::new(),
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let table_name = Self::table_name(name)?;
        if let Some(existing) = self.registered(name).await? {
            return check_dimensions(name, existing.dimensions, dimensions);
        }

        // Table and registry row commit together, so a rejected CREATE TABLE
        // leaves no registered collection behind.
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {table_name} (\
                seq BIGSERIAL, \
                id TEXT PRIMARY KEY, \
                text TEXT NOT NULL, \
                embedding vector({dimensions}) NOT NULL, \
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
                document_id TEXT NOT NULL\
            )"
        );
        let register_sql = format!(
            "INSERT INTO {REGISTRY_TABLE} (name, table_name, dimensions) \
             VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING"
        );

        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        sqlx::query(&create_sql).execute(&mut *tx).await.map_err(Self::map_err)?;
        sqlx::query(&register_sql)
            .bind(name)
            .bind(&table_name)
            .bind(dimensions as i32)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_err)?;
        tx.commit().await.map_err(Self::map_err)?;

        // Another writer may have registered the name first.
        let registered = self.require(name).await?;
        check_dimensions(name, registered.dimensions, dimensions)?;

        debug!(collection = name, table = %table_name, dimensions, "created pgvector table");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let Some(registered) = self.registered(name).await? else {
            debug!(collection = name, "no pgvector collection to delete");
            return Ok(());
        };

        let drop_sql = format!("DROP TABLE IF EXISTS {}", registered.table_name);
        let unregister_sql = format!("DELETE FROM {REGISTRY_TABLE} WHERE name = $1");

        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        sqlx::query(&drop_sql).execute(&mut *tx).await.map_err(Self::map_err)?;
        sqlx::query(&unregister_sql).bind(name).execute(&mut *tx).await.map_err(Self::map_err)?;
        tx.commit().await.map_err(Self::map_err)?;

        debug!(collection = name, table = %registered.table_name, "deleted pgvector table");
        Ok(())
    }

    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.registered(name).await?.map(|r| r.dimensions))
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let Registered { table_name, dimensions } = self.require(collection).await?;
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dimensions) {
            return Err(RagError::SchemaError {
                collection: collection.to_string(),
                expected: dimensions,
                actual: bad.embedding.len(),
            });
        }
        if chunks.is_empty() {
            return Ok(());
        }

        // seq is left untouched on conflict so a replaced record keeps its position.
        let upsert_sql = format!(
            "INSERT INTO {table_name} (id, text, embedding, metadata, document_id) \
             VALUES ($1, $2, $3::vector, $4::jsonb, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                text = EXCLUDED.text, \
                embedding = EXCLUDED.embedding, \
                metadata = EXCLUDED.metadata, \
                document_id = EXCLUDED.document_id"
        );

        for chunk in chunks {
            let metadata_json = serde_json::to_string(&chunk.metadata).map_err(|e| {
                RagError::VectorStoreError {
                    backend: BACKEND.to_string(),
                    message: format!("failed to serialize metadata for '{}': {e}", chunk.id),
                }
            })?;

            sqlx::query(&upsert_sql)
                .bind(&chunk.id)
                .bind(&chunk.text)
                .bind(format_vector(&chunk.embedding))
                .bind(&metadata_json)
                .bind(&chunk.document_id)
                .execute(&self.pool)
                .await
                .map_err(Self::map_err)?;
        }

        debug!(collection, count = chunks.len(), "upserted chunks to pgvector");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let Registered { table_name, .. } = self.require(collection).await?;
        if ids.is_empty() {
            return Ok(());
        }

        let delete_sql = format!("DELETE FROM {table_name} WHERE id = ANY($1)");
        let id_vec: Vec<String> = ids.iter().map(|s| s.to_string()).collect();

        sqlx::query(&delete_sql).bind(&id_vec).execute(&self.pool).await.map_err(Self::map_err)?;

        debug!(collection, count = ids.len(), "deleted chunks from pgvector");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let Registered { table_name, dimensions } = self.require(collection).await?;
        check_dimensions(collection, dimensions, embedding.len())?;

        let exists_sql = format!("SELECT EXISTS (SELECT 1 FROM {table_name}) AS populated");
        let populated: bool = sqlx::query(&exists_sql)
            .fetch_one(&self.pool)
            .await
            .and_then(|row| row.try_get("populated"))
            .map_err(Self::map_err)?;
        if !populated {
            return Err(RagError::EmptyCollection(collection.to_string()));
        }

        let op = self.metric.operator();
        let search_sql = format!(
            "SELECT id, text, metadata, document_id, embedding::text AS embedding, \
                    (embedding {op} $1::vector)::float8 AS score \
             FROM {table_name} \
             ORDER BY embedding {op} $1::vector, seq \
             LIMIT $2"
        );

        let rows = sqlx::query(&search_sql)
            .bind(format_vector(embedding))
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_err)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(Self::map_err)?;
            let text: String = row.try_get("text").map_err(Self::map_err)?;
            let document_id: String = row.try_get("document_id").map_err(Self::map_err)?;
            let score: f64 = row.try_get("score").map_err(Self::map_err)?;
            let embedding_text: String = row.try_get("embedding").map_err(Self::map_err)?;
            let metadata_value: serde_json::Value =
                row.try_get("metadata").map_err(Self::map_err)?;

            results.push(SearchResult {
                chunk: Chunk {
                    id,
                    text,
                    embedding: parse_vector(&embedding_text)?,
                    metadata: metadata_from_json(metadata_value),
                    document_id,
                },
                score: score as f32,
            });
        }

        debug!(collection, result_count = results.len(), "pgvector search completed");
        Ok(results)
    }
}
