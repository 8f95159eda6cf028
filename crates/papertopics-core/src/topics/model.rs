use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::summary::summarize;
use super::traits::{ClustererFactory, Embedder, TopicBatch, TopicClusterer, TopicError, TopicResult};
use crate::record::{Record, TopicId, TopicInfo};

/// Whether the clusterer used for a run was trained in it or restored from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOrigin {
    Trained,
    Loaded,
}

impl std::fmt::Display for ModelOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trained => write!(f, "trained"),
            Self::Loaded => write!(f, "loaded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopicModelOutput {
    /// One topic id per input record, in input order
    pub assignments: Vec<TopicId>,
    pub summary: Vec<TopicInfo>,
    pub origin: ModelOrigin,
}

/// Trains a clusterer batch by batch over record titles, or reuses the one
/// saved at `model_path`, then assigns every record a topic.
pub struct IncrementalTopicModel {
    embedder: Box<dyn Embedder>,
    factory: Box<dyn ClustererFactory>,
    model_path: PathBuf,
    batch_size: usize,
}

impl IncrementalTopicModel {
    pub fn new(
        embedder: Box<dyn Embedder>,
        factory: Box<dyn ClustererFactory>,
        model_path: impl Into<PathBuf>,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            factory,
            model_path: model_path.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub async fn fit_or_load(&self, records: &[Record]) -> TopicResult<TopicModelOutput> {
        if records.is_empty() {
            return Err(TopicError::NoRecords);
        }

        let titles: Vec<String> = records.iter().map(|r| r.title.clone()).collect();

        let (clusterer, origin) = if self.model_path.exists() {
            tracing::info!(path = %self.model_path.display(), "Loading saved topic model");
            (self.factory.load(&self.model_path)?, ModelOrigin::Loaded)
        } else {
            (self.train(&titles).await?, ModelOrigin::Trained)
        };

        let mut assignments = Vec::with_capacity(titles.len());
        for chunk in titles.chunks(self.batch_size) {
            let embeddings = self.embed_chunk(chunk).await?;
            let topics = clusterer.transform(&TopicBatch::new(chunk, &embeddings)?)?;
            if topics.len() != chunk.len() {
                return Err(TopicError::LengthMismatch {
                    expected: chunk.len(),
                    actual: topics.len(),
                });
            }
            assignments.extend(topics);
        }

        let summary = summarize(&assignments, &clusterer.topic_labels());
        Ok(TopicModelOutput {
            assignments,
            summary,
            origin,
        })
    }

    async fn train(&self, titles: &[String]) -> TopicResult<Box<dyn TopicClusterer>> {
        let total = titles.len().div_ceil(self.batch_size);
        tracing::info!(
            records = titles.len(),
            batches = total,
            embedder = self.embedder.name(),
            "Training topic model"
        );

        let mut clusterer = self.factory.create();
        for (index, chunk) in titles.chunks(self.batch_size).enumerate() {
            let embeddings = self.embed_chunk(chunk).await?;
            clusterer.partial_fit(&TopicBatch::new(chunk, &embeddings)?)?;
            tracing::debug!(batch = index + 1, total, size = chunk.len(), "Fitted batch");
        }

        self.persist(clusterer.as_ref())?;
        tracing::info!(path = %self.model_path.display(), "Saved topic model");
        Ok(clusterer)
    }

    async fn embed_chunk(&self, chunk: &[String]) -> TopicResult<Vec<Vec<f32>>> {
        let embeddings = self.embedder.embed(chunk).await?;
        if embeddings.len() != chunk.len() {
            return Err(TopicError::LengthMismatch {
                expected: chunk.len(),
                actual: embeddings.len(),
            });
        }
        Ok(embeddings)
    }

    /// Saves into a sibling directory and renames it into place, so an
    /// interrupted save never leaves a half-written model at `model_path`.
    fn persist(&self, clusterer: &dyn TopicClusterer) -> TopicResult<()> {
        let staging = staging_path(&self.model_path);
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| TopicError::io(&staging, e))?;
        }

        if let Err(e) = clusterer.save(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        std::fs::rename(&staging, &self.model_path).map_err(|e| TopicError::io(&self.model_path, e))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("topic_model"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::topics::{HashingEmbedder, KMeansConfig, KMeansFactory};

    /// Hashing embedder that records the size of every call.
    struct RecordingEmbedder {
        inner: HashingEmbedder,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait::async_trait]
    impl Embedder for RecordingEmbedder {
        fn name(&self) -> &str {
            "recording"
        }

        async fn embed(&self, texts: &[String]) -> TopicResult<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push(texts.len());
            self.inner.embed(texts).await
        }
    }

    struct FailingEmbedder;

    #[async_trait::async_trait]
    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[String]) -> TopicResult<Vec<Vec<f32>>> {
            Err(TopicError::Embedding("service unavailable".to_string()))
        }
    }

    struct ShortEmbedder;

    #[async_trait::async_trait]
    impl Embedder for ShortEmbedder {
        fn name(&self) -> &str {
            "short"
        }

        async fn embed(&self, _texts: &[String]) -> TopicResult<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0]])
        }
    }

    fn factory() -> Box<dyn ClustererFactory> {
        Box::new(KMeansFactory::new(KMeansConfig {
            n_clusters: 2,
            ..KMeansConfig::default()
        }))
    }

    fn model(path: &Path, batch_size: usize) -> (IncrementalTopicModel, Arc<Mutex<Vec<usize>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let embedder = RecordingEmbedder {
            inner: HashingEmbedder::new(32),
            calls: Arc::clone(&calls),
        };
        (
            IncrementalTopicModel::new(Box::new(embedder), factory(), path, batch_size),
            calls,
        )
    }

    fn records() -> Vec<Record> {
        [
            "deep learning vision",
            "deep learning language",
            "soil nitrogen",
            "soil moisture",
            "pomegranate extract",
        ]
        .iter()
        .map(|t| Record::new(*t, ""))
        .collect()
    }

    #[tokio::test]
    async fn test_trains_in_contiguous_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topic_model");
        let (model, calls) = model(&path, 2);

        let output = model.fit_or_load(&records()).await.unwrap();

        assert_eq!(output.origin, ModelOrigin::Trained);
        // Three training chunks, then the same three for assignment.
        assert_eq!(*calls.lock().unwrap(), vec![2, 2, 1, 2, 2, 1]);
        assert_eq!(output.assignments.len(), 5);
        assert!(path.join("model.json").exists());
        assert!(!dir.path().join("topic_model.tmp").exists());
    }

    #[tokio::test]
    async fn test_summary_covers_assignments() {
        let dir = tempfile::tempdir().unwrap();
        let (model, _) = model(&dir.path().join("m"), 1000);

        let output = model.fit_or_load(&records()).await.unwrap();

        let total: usize = output.summary.iter().map(|t| t.count).sum();
        assert_eq!(total, output.assignments.len());
        for topic in &output.assignments {
            assert!(output.summary.iter().any(|t| t.topic == *topic));
        }
    }

    #[tokio::test]
    async fn test_second_run_loads_saved_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topic_model");

        let (first, _) = model(&path, 2);
        let trained = first.fit_or_load(&records()).await.unwrap();

        let (second, calls) = model(&path, 2);
        let loaded = second.fit_or_load(&records()).await.unwrap();

        assert_eq!(loaded.origin, ModelOrigin::Loaded);
        assert_eq!(*calls.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(loaded.assignments, trained.assignments);
    }

    #[tokio::test]
    async fn test_embedding_failure_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topic_model");
        let model = IncrementalTopicModel::new(Box::new(FailingEmbedder), factory(), &path, 10);

        let err = model.fit_or_load(&records()).await.unwrap_err();

        assert!(matches!(err, TopicError::Embedding(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rejects_misaligned_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let model = IncrementalTopicModel::new(
            Box::new(ShortEmbedder),
            factory(),
            dir.path().join("m"),
            10,
        );

        let err = model.fit_or_load(&records()).await.unwrap_err();
        assert!(matches!(
            err,
            TopicError::LengthMismatch {
                expected: 5,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (model, calls) = model(&dir.path().join("m"), 10);

        let err = model.fit_or_load(&[]).await.unwrap_err();
        assert!(matches!(err, TopicError::NoRecords));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_staging_path_is_sibling() {
        assert_eq!(
            staging_path(Path::new("models/topic_model")),
            PathBuf::from("models/topic_model.tmp")
        );
    }
}
