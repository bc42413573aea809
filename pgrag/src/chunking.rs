//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and [`FixedSizeChunker`], which
//! splits by character count with configurable overlap.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Split every document, keeping document order and chunk order within each document.
    fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|document| self.chunk(document)).collect()
    }
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Sizes are counted in `char`s, so a window never ends inside a multi-byte
/// UTF-8 sequence. Chunk `i` starts at character `i * (chunk_size - chunk_overlap)`
/// and splitting stops at the first window that reaches the end of the text.
/// Dropping the first `chunk_overlap` characters of every chunk after the
/// first and concatenating gives back the original text.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus `chunk_index` and `start_index` fields.
///
/// # Example
///
/// ```rust,ignore
/// use pgrag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(1000, 0)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Character windows as `(start_char, byte_range)` pairs.
    fn windows(&self, text: &str) -> Vec<(usize, std::ops::Range<usize>)> {
        // Byte offset of every char boundary, including the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            windows.push((start, boundaries[start]..boundaries[end]));
            if end == char_count {
                break;
            }
            start += step;
        }
        windows
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        self.windows(&document.text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start_char, range))| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), chunk_index.into());
                metadata.insert("start_index".to_string(), start_char.into());

                Chunk {
                    id: format!("{}_{chunk_index}", document.id),
                    text: document.text[range].to_string(),
                    embedding: Vec::new(),
                    metadata,
                    document_id: document.id.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new(text).with_id("doc")
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(FixedSizeChunker::new(0, 0), Err(RagError::ConfigError(_))));
        assert!(matches!(FixedSizeChunker::new(10, 10), Err(RagError::ConfigError(_))));
        assert!(matches!(FixedSizeChunker::new(10, 11), Err(RagError::ConfigError(_))));
        assert!(FixedSizeChunker::new(10, 9).is_ok());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = FixedSizeChunker::new(100, 10).unwrap().chunk(&doc("hello"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!(chunks[0].id, "doc_0");
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(FixedSizeChunker::new(5, 1).unwrap().chunk(&doc("")).is_empty());
    }

    #[test]
    fn overlap_repeats_tail_of_previous_chunk() {
        let chunks = FixedSizeChunker::new(5, 2).unwrap().chunk(&doc("0123456789"));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["01234", "34567", "6789"]);
        assert_eq!(chunks[2].metadata.get("start_index"), Some(&serde_json::json!(6)));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let chunks = FixedSizeChunker::new(2, 0).unwrap().chunk(&doc("héllo wörld"));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 2));
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, "héllo wörld");
    }
}
