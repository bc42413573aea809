//! Loading text files into [`Document`]s.
//!
//! [`TextLoader`] reads a file wholesale and turns it into one document per
//! file, or one document per delimited record, depending on its
//! [`LoadPolicy`]. No chunking or other transformation happens here.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::document::{Document, Metadata};
use crate::error::{RagError, Result};

/// A source of raw documents.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load every document from the source, in source order.
    async fn load(&self) -> Result<Vec<Document>>;
}

/// How a file is divided into documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// The whole file becomes a single document.
    #[default]
    WholeFile,
    /// One document per non-blank record between occurrences of the separator.
    Delimited(String),
    /// One document per non-blank line.
    Lines,
}

/// Loads a plain text (or CSV) file from disk.
///
/// # Example
///
/// ```rust,ignore
/// use pgrag::{LoadPolicy, TextLoader, DocumentLoader};
///
/// let docs = TextLoader::new("finance_blog_samples.csv").load().await?;
/// let rows = TextLoader::new("rows.csv").with_policy(LoadPolicy::Lines).load().await?;
/// ```
#[derive(Debug, Clone)]
pub struct TextLoader {
    path: PathBuf,
    policy: LoadPolicy,
}

impl TextLoader {
    /// Create a loader for the given path using [`LoadPolicy::WholeFile`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), policy: LoadPolicy::default() }
    }

    /// Set the splitting policy.
    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The path this loader reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, message: impl Into<String>) -> RagError {
        RagError::ReadError { path: self.path.clone(), message: message.into() }
    }

    fn base_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), self.path.display().to_string().into());
        metadata
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn split_records(&self, content: String, separator: &str) -> Result<Vec<Document>> {
        if separator.is_empty() {
            return Err(RagError::ConfigError("record separator must not be empty".to_string()));
        }

        let name = self.file_name();
        let source = self.path.display().to_string();
        let documents: Vec<Document> = content
            .split(separator)
            .filter(|record| !record.trim().is_empty())
            .enumerate()
            .map(|(index, record)| {
                let mut metadata = self.base_metadata();
                metadata.insert("record_index".to_string(), index.into());
                Document {
                    id: format!("{name}#{index}"),
                    text: record.to_string(),
                    metadata,
                    source_uri: Some(source.clone()),
                }
            })
            .collect();

        if documents.is_empty() {
            return Err(self.read_error("file contains no records"));
        }
        Ok(documents)
    }
}

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RagError::NotFound { path: self.path.clone() },
            _ => self.read_error(e.to_string()),
        })?;

        let content = String::from_utf8(bytes)
            .map_err(|e| self.read_error(format!("content is not valid UTF-8: {e}")))?;
        debug!(path = %self.path.display(), bytes = content.len(), "read input file");

        let documents = match &self.policy {
            LoadPolicy::WholeFile => vec![Document {
                id: self.file_name(),
                text: content,
                metadata: self.base_metadata(),
                source_uri: Some(self.path.display().to_string()),
            }],
            LoadPolicy::Delimited(separator) => self.split_records(content, separator)?,
            LoadPolicy::Lines => self.split_records(content, "\n")?,
        };

        info!(path = %self.path.display(), document_count = documents.len(), "loaded documents");
        Ok(documents)
    }
}
