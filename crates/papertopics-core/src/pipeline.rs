use std::convert::Infallible;
use std::time::Instant;

use crate::config::{EmbedderConfig, EmbedderKind, PipelineConfig, StopwordConfig};
use crate::error::{Error, Result};
use crate::harvest::{Harvester, HttpPageFetcher, PageFetcher};
use crate::record::{ClusteringResults, Record};
use crate::stage::{RegenerationPolicy, StageCache};
use crate::text::{Normalizer, Preprocessor, StopwordSet};
use crate::topics::{
    Embedder, HashingEmbedder, HttpEmbedder, IncrementalTopicModel, KMeansConfig, KMeansFactory,
};

pub const SCRAPE_STAGE: &str = "scrape";
pub const PREPROCESS_STAGE: &str = "preprocess";
pub const CLUSTER_STAGE: &str = "cluster";

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub raw_records: usize,
    pub preprocessed_records: usize,
    pub results: ClusteringResults,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn topic_count(&self) -> usize {
        self.results.topic_count()
    }
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Completed(PipelineReport),
    /// Nothing survived preprocessing, so clustering was skipped.
    EmptyInput,
}

/// Scrape, preprocess and cluster, each stage gated by the stage cache.
pub struct Pipeline {
    config: PipelineConfig,
    cache: StageCache,
    harvester: Harvester,
    preprocessor: Preprocessor,
    topic_model: IncrementalTopicModel,
}

impl Pipeline {
    /// Validates `config` and wires the default HTTP fetcher, the configured
    /// stopword lists and embedder, and the online k-means clusterer.
    pub fn from_config(config: PipelineConfig, policy: Box<dyn RegenerationPolicy>) -> Result<Self> {
        config.validate()?;

        let fetcher = HttpPageFetcher::new(&config.harvest)
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        let normalizer = build_normalizer(&config, &config.stopwords)?;
        let embedder = build_embedder(&config.embedder)?;

        tracing::debug!(
            stopwords = ?normalizer.set_names(),
            embedder = embedder.name(),
            "Pipeline configured"
        );

        Ok(Self {
            harvester: Harvester::new(Box::new(fetcher), &config.harvest)
                .with_max_pages(config.max_pages),
            preprocessor: Preprocessor::new(normalizer),
            topic_model: topic_model(&config, embedder),
            cache: StageCache::new(policy),
            config,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn PageFetcher>) -> Self {
        self.harvester =
            Harvester::new(fetcher, &self.config.harvest).with_max_pages(self.config.max_pages);
        self
    }

    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.topic_model = topic_model(&self.config, embedder);
        self
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let query = self.config.query.as_str();

        let harvester = &self.harvester;
        let raw: Vec<Record> = self
            .cache
            .run(SCRAPE_STAGE, &self.config.scraped_path(), move || {
                harvester.harvest(query)
            })
            .await?;

        let preprocessor = &self.preprocessor;
        let raw_ref = &raw;
        let cleaned: Vec<Record> = self
            .cache
            .run(PREPROCESS_STAGE, &self.config.preprocessed_path(), move || async move {
                let (cleaned, stats) = preprocessor.preprocess(raw_ref);
                tracing::info!(
                    input = stats.input,
                    output = stats.output,
                    duplicates = stats.duplicates(),
                    "Preprocessed records"
                );
                Ok::<_, Infallible>(cleaned)
            })
            .await?;

        if cleaned.is_empty() {
            tracing::error!("No valid preprocessed data; skipping clustering");
            return Ok(PipelineOutcome::EmptyInput);
        }

        let topic_model = &self.topic_model;
        let cleaned_ref = &cleaned;
        let aligned = |saved: &ClusteringResults| saved.clusters.len() == cleaned_ref.len();
        let compute = move || async move {
            let output = topic_model.fit_or_load(cleaned_ref).await?;
            tracing::info!(
                origin = %output.origin,
                records = output.assignments.len(),
                "Assigned topics"
            );
            Ok::<_, crate::topics::TopicError>(ClusteringResults {
                clusters: output.assignments,
                topic_info: output.summary,
            })
        };
        let results: ClusteringResults = self
            .cache
            .run_validated(CLUSTER_STAGE, &self.config.clustering_path(), aligned, compute)
            .await?;

        tracing::info!(topics = results.topic_count(), "Clustering complete");
        for (i, name) in results.topic_names().enumerate() {
            tracing::info!("{}. {}", i + 1, name);
        }

        Ok(PipelineOutcome::Completed(PipelineReport {
            raw_records: raw.len(),
            preprocessed_records: cleaned.len(),
            results,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }))
    }
}

fn topic_model(config: &PipelineConfig, embedder: Box<dyn Embedder>) -> IncrementalTopicModel {
    let factory = KMeansFactory::new(KMeansConfig::from(&config.topics));
    IncrementalTopicModel::new(
        embedder,
        Box::new(factory),
        config.model_dir(),
        config.topics.batch_size,
    )
}

fn build_normalizer(config: &PipelineConfig, stopwords: &StopwordConfig) -> Result<Normalizer> {
    let mut sets = stopwords
        .builtin
        .iter()
        .map(|name| StopwordSet::by_name(name))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for file in &stopwords.files {
        sets.push(StopwordSet::from_file(&config.resolve(file))?);
    }

    Ok(Normalizer::new(sets)?)
}

fn build_embedder(config: &EmbedderConfig) -> Result<Box<dyn Embedder>> {
    match config.kind {
        EmbedderKind::Hashing => Ok(Box::new(
            config
                .dimensions
                .map_or_else(HashingEmbedder::default, HashingEmbedder::new),
        )),
        EmbedderKind::OpenAi => HttpEmbedder::new(config)
            .map(|e| Box::new(e) as Box<dyn Embedder>)
            .map_err(|e| Error::Config(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::harvest::{ExtractedItem, ExtractionSchema, FetchResult};
    use crate::stage::{load_artifact, AlwaysRecompute, AlwaysReuse};

    /// Two result pages with titles that collapse to the same text after
    /// normalization.
    struct TwoPageFetcher {
        empty: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl PageFetcher for TwoPageFetcher {
        async fn fetch(
            &self,
            url: &str,
            schema: &ExtractionSchema,
        ) -> FetchResult<Vec<ExtractedItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if schema.has_field("pagination") {
                return Ok(vec![ExtractedItem::from([(
                    "pagination".to_string(),
                    "Page 1 of 2".to_string(),
                )])]);
            }
            if self.empty {
                return Ok(Vec::new());
            }

            let titles: &[&str] = if url.contains("page=1") {
                &["Deep Learning 101", "The Deep   Learning"]
            } else {
                &["Soil nitrogen in rice fields", "Pomegranate peel extract"]
            };
            Ok(titles
                .iter()
                .map(|t| {
                    ExtractedItem::from([
                        ("title".to_string(), (*t).to_string()),
                        ("description".to_string(), "Intro to ML!".to_string()),
                    ])
                })
                .collect())
        }
    }

    fn config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig {
            root: root.to_path_buf(),
            ..PipelineConfig::default()
        };
        config.topics.n_clusters = 2;
        config.topics.batch_size = 2;
        config
    }

    fn pipeline(
        root: &Path,
        policy: Box<dyn RegenerationPolicy>,
        empty: bool,
    ) -> (Pipeline, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = TwoPageFetcher {
            empty,
            calls: Arc::clone(&calls),
        };
        let pipeline = Pipeline::from_config(config(root), policy)
            .unwrap()
            .with_fetcher(Box::new(fetcher))
            .with_embedder(Box::new(HashingEmbedder::new(64)));
        (pipeline, calls)
    }

    #[tokio::test]
    async fn test_end_to_end_run() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), Box::new(AlwaysReuse), false);

        let PipelineOutcome::Completed(report) = pipeline.run().await.unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(report.raw_records, 4);
        assert_eq!(report.preprocessed_records, 3);
        assert_eq!(report.results.clusters.len(), 3);

        let cfg = pipeline.config();
        let cleaned: Vec<Record> = load_artifact(&cfg.preprocessed_path()).unwrap();
        assert_eq!(cleaned[0], Record::new("deep learning", "intro ml"));
        let saved: ClusteringResults = load_artifact(&cfg.clustering_path()).unwrap();
        assert_eq!(saved, report.results);
        assert!(cfg.model_dir().join("model.json").exists());
    }

    #[tokio::test]
    async fn test_second_run_reuses_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = pipeline(dir.path(), Box::new(AlwaysReuse), false);
        first.run().await.unwrap();
        let before = std::fs::read(first.config().clustering_path()).unwrap();

        let (second, calls) = pipeline(dir.path(), Box::new(AlwaysReuse), false);
        second.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(second.config().clustering_path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_stale_clustering_artifact_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), Box::new(AlwaysReuse), false);
        let stale = ClusteringResults {
            clusters: vec![0; 7],
            topic_info: Vec::new(),
        };
        crate::stage::write_artifact(&pipeline.config().clustering_path(), &stale).unwrap();

        let PipelineOutcome::Completed(report) = pipeline.run().await.unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(report.results.clusters.len(), 3);
        let saved: ClusteringResults = load_artifact(&pipeline.config().clustering_path()).unwrap();
        assert_eq!(saved, report.results);
    }

    #[tokio::test]
    async fn test_regenerate_refetches() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = pipeline(dir.path(), Box::new(AlwaysReuse), false);
        first.run().await.unwrap();

        let (second, calls) = pipeline(dir.path(), Box::new(AlwaysRecompute), false);
        second.run().await.unwrap();

        // Pagination banner plus two pages.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_input_skips_clustering() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), Box::new(AlwaysReuse), true);

        let outcome = pipeline.run().await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::EmptyInput));
        let cfg = pipeline.config();
        assert!(cfg.preprocessed_path().exists());
        assert!(!cfg.clustering_path().exists());
        assert!(!cfg.model_dir().exists());
    }

    #[test]
    fn test_missing_stopword_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.stopwords.files.push("missing.txt".into());

        let result = Pipeline::from_config(config, Box::new(AlwaysReuse));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_openai_without_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.embedder.kind = EmbedderKind::OpenAi;

        let result = Pipeline::from_config(config, Box::new(AlwaysReuse));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
