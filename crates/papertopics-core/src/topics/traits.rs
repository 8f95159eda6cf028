use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::TopicId;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Clustering failed: {0}")]
    Clustering(String),
    #[error("Embedding dimension mismatch: model expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Expected {expected} results, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("No records to cluster")]
    NoRecords,
    #[error("Model I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Model state is invalid: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TopicError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type TopicResult<T> = Result<T, TopicError>;

/// Texts paired with their embeddings, index for index.
#[derive(Debug, Clone, Copy)]
pub struct TopicBatch<'a> {
    texts: &'a [String],
    embeddings: &'a [Vec<f32>],
}

impl<'a> TopicBatch<'a> {
    pub fn new(texts: &'a [String], embeddings: &'a [Vec<f32>]) -> TopicResult<Self> {
        if texts.len() != embeddings.len() {
            return Err(TopicError::LengthMismatch {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }
        Ok(Self { texts, embeddings })
    }

    pub const fn texts(&self) -> &'a [String] {
        self.texts
    }

    pub const fn embeddings(&self) -> &'a [Vec<f32>] {
        self.embeddings
    }

    pub const fn len(&self) -> usize {
        self.texts.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a String, &'a Vec<f32>)> {
        self.texts.iter().zip(self.embeddings.iter())
    }
}

/// Human-readable description of one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicLabel {
    pub name: String,
    pub representation: Vec<String>,
}

/// Text to fixed-size vector.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> TopicResult<Vec<Vec<f32>>>;
}

/// A clustering model that can be trained one batch at a time.
pub trait TopicClusterer: Send {
    fn partial_fit(&mut self, batch: &TopicBatch<'_>) -> TopicResult<()>;

    /// One topic id per batch entry, in batch order.
    fn transform(&self, batch: &TopicBatch<'_>) -> TopicResult<Vec<TopicId>>;

    fn topic_labels(&self) -> BTreeMap<TopicId, TopicLabel>;

    /// Writes the model bundle into the directory `path`.
    fn save(&self, path: &Path) -> TopicResult<()>;
}

/// Creates fresh clusterers and restores saved ones.
pub trait ClustererFactory: Send + Sync {
    fn create(&self) -> Box<dyn TopicClusterer>;

    fn load(&self, path: &Path) -> TopicResult<Box<dyn TopicClusterer>>;
}
