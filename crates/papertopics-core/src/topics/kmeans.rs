//! Online mini-batch k-means over embeddings, with per-topic keyword counts
//! that decay between batches.
//!
//! Centroids are seeded lazily with k-means++ from the first batches seen and
//! then moved towards each assigned point with a per-centroid learning rate of
//! `1 / count`. All randomness comes from a seeded RNG, so presenting the same
//! batches in the same order yields the same model.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::traits::{ClustererFactory, TopicBatch, TopicClusterer, TopicError, TopicLabel, TopicResult};
use crate::config::TopicConfig;
use crate::record::{TopicId, OUTLIER_TOPIC};
use crate::text::StopwordSet;

const BUNDLE_FILE: &str = "model.json";
const BUNDLE_KIND: &str = "online_kmeans";
const BUNDLE_VERSION: u32 = 1;
const LABEL_WORDS: usize = 4;
const MIN_WEIGHT: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    pub n_clusters: usize,
    pub seed: u64,
    pub keyword_decay: f64,
    pub top_keywords: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self::from(&TopicConfig::default())
    }
}

impl From<&TopicConfig> for KMeansConfig {
    fn from(config: &TopicConfig) -> Self {
        Self {
            n_clusters: config.n_clusters.max(1),
            seed: config.seed,
            keyword_decay: config.keyword_decay,
            top_keywords: config.top_keywords,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineKMeans {
    config: KMeansConfig,
    dimension: Option<usize>,
    centroids: Vec<Vec<f32>>,
    counts: Vec<u64>,
    keywords: Vec<BTreeMap<String, f64>>,
    batches_seen: u64,
    updated_at: Option<DateTime<Utc>>,
    #[serde(skip, default = "StopwordSet::english")]
    stopwords: StopwordSet,
}

#[derive(Serialize, Deserialize)]
struct ModelBundle {
    kind: String,
    version: u32,
    model: OnlineKMeans,
}

impl OnlineKMeans {
    #[must_use]
    pub fn new(config: KMeansConfig) -> Self {
        Self {
            config,
            dimension: None,
            centroids: Vec::new(),
            counts: Vec::new(),
            keywords: Vec::new(),
            batches_seen: 0,
            updated_at: None,
            stopwords: StopwordSet::english(),
        }
    }

    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn n_topics(&self) -> usize {
        self.centroids.len()
    }

    pub const fn batches_seen(&self) -> u64 {
        self.batches_seen
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn load(path: &Path) -> TopicResult<Self> {
        let file = path.join(BUNDLE_FILE);
        let bytes = std::fs::read(&file).map_err(|e| TopicError::io(&file, e))?;
        let bundle: ModelBundle = serde_json::from_slice(&bytes)?;

        if bundle.kind != BUNDLE_KIND || bundle.version != BUNDLE_VERSION {
            return Err(TopicError::Clustering(format!(
                "unsupported model bundle {} v{} at {}",
                bundle.kind,
                bundle.version,
                path.display()
            )));
        }

        let model = bundle.model;
        if model.centroids.len() != model.counts.len()
            || model.centroids.len() != model.keywords.len()
        {
            return Err(TopicError::Clustering(format!(
                "inconsistent model state at {}",
                path.display()
            )));
        }
        Ok(model)
    }

    fn check_dimension(&self, embedding: &[f32]) -> TopicResult<()> {
        match self.dimension {
            Some(expected) if expected != embedding.len() => Err(TopicError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }),
            _ => Ok(()),
        }
    }

    fn nearest(&self, point: &[f32]) -> Option<usize> {
        self.centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, squared_distance(point, c)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// k-means++ seeding of the still-empty centroid slots from `points`.
    fn seed_centroids(&mut self, points: &[&[f32]], rng: &mut StdRng) {
        let wanted = self.config.n_clusters.saturating_sub(self.centroids.len());

        for _ in 0..wanted.min(points.len()) {
            let next = if self.centroids.is_empty() {
                Some(rng.random_range(0..points.len()))
            } else {
                let distances: Vec<f64> = points
                    .iter()
                    .map(|p| {
                        self.centroids
                            .iter()
                            .map(|c| f64::from(squared_distance(p, c)))
                            .fold(f64::INFINITY, f64::min)
                    })
                    .collect();
                let total: f64 = distances.iter().sum();
                if total <= 0.0 {
                    None
                } else {
                    let threshold = rng.random::<f64>() * total;
                    let mut cumulative = 0.0;
                    distances
                        .iter()
                        .position(|d| {
                            cumulative += d;
                            *d > 0.0 && cumulative >= threshold
                        })
                        .or_else(|| distances.iter().rposition(|d| *d > 0.0))
                }
            };

            // Every remaining point coincides with a centroid.
            let Some(index) = next else {
                break;
            };

            self.centroids.push(points[index].to_vec());
            self.counts.push(0);
            self.keywords.push(BTreeMap::new());
        }
    }

    fn decay_keywords(&mut self) {
        let keep = 1.0 - self.config.keyword_decay;
        for words in &mut self.keywords {
            for weight in words.values_mut() {
                *weight *= keep;
            }
            words.retain(|_, w| *w >= MIN_WEIGHT);
        }
    }

    fn add_keywords(&mut self, topic: usize, text: &str) {
        let words = &mut self.keywords[topic];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            if token.chars().count() < 2
                || !token.chars().any(char::is_alphabetic)
                || self.stopwords.contains(&token)
            {
                continue;
            }
            *words.entry(token).or_insert(0.0) += 1.0;
        }
    }

    fn top_keywords(&self, topic: usize, n: usize) -> Vec<String> {
        let mut ranked: Vec<(&String, &f64)> = self.keywords[topic].iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(n).map(|(w, _)| w.clone()).collect()
    }
}

impl TopicClusterer for OnlineKMeans {
    fn partial_fit(&mut self, batch: &TopicBatch<'_>) -> TopicResult<()> {
        let dimension = self.dimension.or_else(|| {
            batch
                .embeddings()
                .iter()
                .map(Vec::len)
                .find(|len| *len > 0)
        });
        if let Some(expected) = dimension {
            if let Some(bad) = batch.embeddings().iter().find(|e| e.len() != expected) {
                return Err(TopicError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }
        self.dimension = dimension;

        let mut texts = Vec::with_capacity(batch.len());
        let mut points = Vec::with_capacity(batch.len());
        for (text, embedding) in batch.iter() {
            if norm(embedding) > 0.0 {
                texts.push(text.as_str());
                points.push(embedding.as_slice());
            }
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(self.batches_seen));
        self.batches_seen += 1;
        self.decay_keywords();

        if points.is_empty() {
            return Ok(());
        }

        self.seed_centroids(&points, &mut rng);

        let assignments: Vec<usize> = points
            .iter()
            .map(|p| self.nearest(p).unwrap_or(0))
            .collect();

        for ((point, text), topic) in points.iter().zip(&texts).zip(assignments) {
            self.counts[topic] += 1;
            let rate = 1.0 / self.counts[topic] as f32;
            for (c, x) in self.centroids[topic].iter_mut().zip(point.iter()) {
                *c += rate * (x - *c);
            }
            self.add_keywords(topic, text);
        }

        self.updated_at = Some(Utc::now());
        tracing::debug!(
            batch = self.batches_seen,
            points = points.len(),
            topics = self.centroids.len(),
            "Updated k-means model"
        );
        Ok(())
    }

    fn transform(&self, batch: &TopicBatch<'_>) -> TopicResult<Vec<TopicId>> {
        batch
            .embeddings()
            .iter()
            .map(|embedding| {
                self.check_dimension(embedding)?;
                if norm(embedding) == 0.0 {
                    return Ok(OUTLIER_TOPIC);
                }
                Ok(self
                    .nearest(embedding)
                    .map_or(OUTLIER_TOPIC, |i| i as TopicId))
            })
            .collect()
    }

    fn topic_labels(&self) -> BTreeMap<TopicId, TopicLabel> {
        (0..self.centroids.len())
            .map(|topic| {
                let representation = self.top_keywords(topic, self.config.top_keywords);
                let name = std::iter::once(topic.to_string())
                    .chain(representation.iter().take(LABEL_WORDS).cloned())
                    .collect::<Vec<_>>()
                    .join("_");
                (
                    topic as TopicId,
                    TopicLabel {
                        name,
                        representation,
                    },
                )
            })
            .collect()
    }

    fn save(&self, path: &Path) -> TopicResult<()> {
        std::fs::create_dir_all(path).map_err(|e| TopicError::io(path, e))?;

        let bundle = ModelBundle {
            kind: BUNDLE_KIND.to_string(),
            version: BUNDLE_VERSION,
            model: self.clone(),
        };
        let file = path.join(BUNDLE_FILE);
        let bytes = serde_json::to_vec_pretty(&bundle)?;
        std::fs::write(&file, bytes).map_err(|e| TopicError::io(&file, e))
    }
}

/// Builds [`OnlineKMeans`] models with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct KMeansFactory {
    config: KMeansConfig,
}

impl KMeansFactory {
    #[must_use]
    pub const fn new(config: KMeansConfig) -> Self {
        Self { config }
    }
}

impl ClustererFactory for KMeansFactory {
    fn create(&self) -> Box<dyn TopicClusterer> {
        Box::new(OnlineKMeans::new(self.config))
    }

    fn load(&self, path: &Path) -> TopicResult<Box<dyn TopicClusterer>> {
        Ok(Box::new(OnlineKMeans::load(path)?))
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n_clusters: usize) -> KMeansConfig {
        KMeansConfig {
            n_clusters,
            seed: 7,
            keyword_decay: 0.0,
            top_keywords: 5,
        }
    }

    fn fixture() -> (Vec<String>, Vec<Vec<f32>>) {
        let texts = vec![
            "neural network training".to_string(),
            "neural network pruning".to_string(),
            "soil nitrogen crops".to_string(),
            "soil water crops".to_string(),
        ];
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![0.99, 0.01],
            vec![0.0, 1.0],
            vec![0.01, 0.99],
        ];
        (texts, embeddings)
    }

    fn trained(n_clusters: usize) -> OnlineKMeans {
        let (texts, embeddings) = fixture();
        let mut model = OnlineKMeans::new(config(n_clusters));
        model
            .partial_fit(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap();
        model
    }

    #[test]
    fn test_separates_distinct_groups() {
        let (texts, embeddings) = fixture();
        let model = trained(2);

        let topics = model
            .transform(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap();
        assert_eq!(topics[0], topics[1]);
        assert_eq!(topics[2], topics[3]);
        assert_ne!(topics[0], topics[2]);
        assert_eq!(model.counts().iter().sum::<u64>(), 4);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (texts, embeddings) = fixture();
        let batch = TopicBatch::new(&texts, &embeddings).unwrap();

        let a = trained(2).transform(&batch).unwrap();
        let b = trained(2).transform(&batch).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fewer_points_than_clusters() {
        let texts = vec!["only one".to_string()];
        let embeddings = vec![vec![0.5, 0.5]];
        let mut model = OnlineKMeans::new(config(10));
        model
            .partial_fit(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap();
        assert_eq!(model.n_topics(), 1);
    }

    #[test]
    fn test_zero_vector_is_outlier() {
        let model = trained(2);
        let texts = vec![String::new()];
        let embeddings = vec![vec![0.0, 0.0]];

        let topics = model
            .transform(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap();
        assert_eq!(topics, vec![OUTLIER_TOPIC]);
    }

    #[test]
    fn test_untrained_model_assigns_outliers() {
        let model = OnlineKMeans::new(config(3));
        let texts = vec!["x".to_string()];
        let embeddings = vec![vec![1.0, 0.0]];

        let topics = model
            .transform(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap();
        assert_eq!(topics, vec![OUTLIER_TOPIC]);
        assert!(model.topic_labels().is_empty());
    }

    #[test]
    fn test_rejects_dimension_change() {
        let mut model = trained(2);
        let texts = vec!["x".to_string()];
        let embeddings = vec![vec![1.0, 0.0, 0.0]];

        let err = model
            .partial_fit(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            TopicError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_rejected_first_batch_leaves_model_untouched() {
        let mut model = OnlineKMeans::new(config(2));
        let texts = vec!["a b".to_string(), "c d".to_string()];
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];

        let err = model
            .partial_fit(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap_err();

        assert!(matches!(
            err,
            TopicError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(model.dimension(), None);
        assert_eq!(model.batches_seen(), 0);
        assert_eq!(model.n_topics(), 0);
    }

    #[test]
    fn test_labels_use_top_keywords() {
        let model = trained(2);
        let (texts, embeddings) = fixture();
        let topics = model
            .transform(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap();
        let labels = model.topic_labels();

        let neural = &labels[&topics[0]];
        assert!(neural.name.starts_with(&format!("{}_", topics[0])));
        assert_eq!(&neural.representation[..2], ["network", "neural"]);

        let soil = &labels[&topics[2]];
        assert_eq!(&soil.representation[..2], ["crops", "soil"]);
    }

    #[test]
    fn test_keywords_skip_stopwords_and_short_tokens() {
        let texts = vec!["the a of deep 42 learning".to_string()];
        let embeddings = vec![vec![1.0, 0.0]];
        let mut model = OnlineKMeans::new(config(1));
        model
            .partial_fit(&TopicBatch::new(&texts, &embeddings).unwrap())
            .unwrap();

        let labels = model.topic_labels();
        assert_eq!(labels[&0].representation, vec!["deep", "learning"]);
        assert_eq!(labels[&0].name, "0_deep_learning");
    }

    #[test]
    fn test_keyword_decay_favours_recent_batches() {
        let mut model = OnlineKMeans::new(KMeansConfig {
            keyword_decay: 0.5,
            ..config(1)
        });
        let first = vec!["alpha alpha".to_string()];
        let second = vec!["beta beta beta".to_string()];
        let embeddings = vec![vec![1.0, 0.0]];

        model
            .partial_fit(&TopicBatch::new(&first, &embeddings).unwrap())
            .unwrap();
        model
            .partial_fit(&TopicBatch::new(&second, &embeddings).unwrap())
            .unwrap();

        assert_eq!(model.topic_labels()[&0].representation[0], "beta");
        assert_eq!(model.batches_seen(), 2);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let model = trained(2);
        model.save(dir.path()).unwrap();

        let restored = KMeansFactory::new(config(2)).load(dir.path()).unwrap();
        assert_eq!(restored.topic_labels(), model.topic_labels());

        let (texts, embeddings) = fixture();
        let batch = TopicBatch::new(&texts, &embeddings).unwrap();
        assert_eq!(
            restored.transform(&batch).unwrap(),
            model.transform(&batch).unwrap()
        );
    }

    #[test]
    fn test_load_rejects_foreign_bundle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(BUNDLE_FILE),
            r#"{"kind":"something_else","version":1,"model":{}}"#,
        )
        .unwrap();

        assert!(OnlineKMeans::load(dir.path()).is_err());
    }
}
