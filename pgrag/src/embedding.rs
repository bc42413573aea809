//! Turning chunk text and queries into fixed-length vectors.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// Maps text to vectors of a fixed length.
///
/// Every vector a provider returns has [`dimensions`](Self::dimensions)
/// elements. A collection is created with that length, so documents and the
/// queries run against them must be embedded by the same model.
///
/// Only [`embed`](Self::embed) is required. Remote backends override
/// [`embed_batch`](Self::embed_batch) to send many texts per request.
///
/// ```rust,ignore
/// let vectors = provider.embed_batch(&["rates held", "earnings beat"]).await?;
/// assert!(vectors.iter().all(|v| v.len() == provider.dimensions()));
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in input order.
    ///
    /// Falls back to one [`embed`](Self::embed) call per text, awaited in turn.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!(text_count = texts.len(), "embedding batch one text at a time");
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector this provider produces.
    fn dimensions(&self) -> usize;
}
