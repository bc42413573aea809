//! Data types for documents, chunks, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key-value metadata attached to documents and chunks.
///
/// Values are JSON scalars in practice (strings and numbers).
pub type Metadata = HashMap<String, serde_json::Value>;

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: Metadata,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with a random id and no metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            metadata: Metadata::new(),
            source_uri: None,
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A segment of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    pub embedding: Vec<f32>,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: Metadata,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// Convert the chunk back into a [`Document`] carrying the chunk's text and metadata.
    pub fn into_document(self) -> Document {
        let source_uri =
            self.metadata.get("source").and_then(|v| v.as_str()).map(ToString::to_string);
        Document { id: self.id, text: self.text, metadata: self.metadata, source_uri }
    }
}

/// A retrieved [`Chunk`] paired with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The distance to the query under the store's metric (lower is closer).
    pub score: f32,
}
