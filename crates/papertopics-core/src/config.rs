use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::harvest::{render_template, ExtractionSchema};

const ENV_PREFIX: &str = "PAPERTOPICS_";

/// Where and how result pages are fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// URL carrying the "Page X of Y" banner; must contain `{query}`
    pub info_url_template: String,
    /// URL of one result page; must contain `{page}` and `{query}`
    pub page_url_template: String,
    pub pagination_schema: ExtractionSchema,
    pub record_schema: ExtractionSchema,
    pub user_agent: String,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            info_url_template: "https://sinta.kemdikbud.go.id/google?q={query}".into(),
            page_url_template: "https://sinta.kemdikbud.go.id/google?page={page}&q={query}".into(),
            pagination_schema: ExtractionSchema::pagination(),
            record_schema: ExtractionSchema::records(),
            user_agent: concat!("papertopics/", env!("CARGO_PKG_VERSION")).into(),
            connect_timeout_seconds: 30,
            request_timeout_seconds: 120,
        }
    }
}

/// Stopword vocabularies unioned by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopwordConfig {
    /// Built-in lists by name (`english`, `indonesian`)
    pub builtin: Vec<String>,
    /// Extra newline-delimited lists; each must exist and be non-empty
    pub files: Vec<PathBuf>,
}

impl Default for StopwordConfig {
    fn default() -> Self {
        Self {
            builtin: vec!["indonesian".into(), "english".into()],
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Local feature hashing, no network
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    #[serde(alias = "openai")]
    OpenAi,
}

impl std::str::FromStr for EmbedderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown embedder '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    /// Vector size for the hashing embedder, requested size for remote models
    pub dimensions: Option<usize>,
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::Hashing,
            dimensions: None,
            model: "text-embedding-3-small".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            request_timeout_seconds: 60,
        }
    }
}

/// Incremental topic model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Records per training/transform chunk
    pub batch_size: usize,
    pub n_clusters: usize,
    pub seed: u64,
    /// Fraction of keyword weight forgotten before each new batch
    pub keyword_decay: f64,
    pub top_keywords: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            n_clusters: 10,
            seed: 0,
            keyword_decay: 0.01,
            top_keywords: 10,
        }
    }
}

/// Everything a pipeline run needs. Relative paths resolve against `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub query: String,
    /// Upper bound on pages harvested; unbounded when absent
    pub max_pages: Option<u32>,
    pub root: PathBuf,
    pub scraped_file: PathBuf,
    pub preprocessed_file: PathBuf,
    pub clustering_file: PathBuf,
    pub model_path: PathBuf,
    pub harvest: HarvestConfig,
    pub stopwords: StopwordConfig,
    pub embedder: EmbedderConfig,
    pub topics: TopicConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            query: "pomegranate".into(),
            max_pages: None,
            root: PathBuf::from("."),
            scraped_file: PathBuf::from("data/raw/sinta_scraped.json"),
            preprocessed_file: PathBuf::from("data/processed/sinta_preprocessed.json"),
            clustering_file: PathBuf::from("results/clustering_results.json"),
            model_path: PathBuf::from("models/topic_model"),
            harvest: HarvestConfig::default(),
            stopwords: StopwordConfig::default(),
            embedder: EmbedderConfig::default(),
            topics: TopicConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the JSON file if given, then `PAPERTOPICS_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))
    }

    /// Applies environment overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(query) = var("QUERY") {
            self.query = query;
        }
        if let Some(pages) = var("MAX_PAGES") {
            self.max_pages = Some(parse_env("MAX_PAGES", &pages)?);
        }
        if let Some(root) = var("ROOT") {
            self.root = PathBuf::from(root);
        }
        if let Some(kind) = var("EMBEDDER") {
            self.embedder.kind = kind.parse()?;
        }
        if let Some(size) = var("BATCH_SIZE") {
            self.topics.batch_size = parse_env("BATCH_SIZE", &size)?;
        }
        if let Some(key) = var("EMBEDDING_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.embedder.api_key = Some(key);
        }

        Ok(self)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn scraped_path(&self) -> PathBuf {
        self.resolve(&self.scraped_file)
    }

    pub fn preprocessed_path(&self) -> PathBuf {
        self.resolve(&self.preprocessed_file)
    }

    pub fn clustering_path(&self) -> PathBuf {
        self.resolve(&self.clustering_file)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.resolve(&self.model_path)
    }

    /// Rejects settings that would fail later in the run.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::Config("query must not be empty".into()));
        }
        if self.topics.batch_size == 0 {
            return Err(Error::Config("topics.batch_size must be at least 1".into()));
        }
        if self.topics.n_clusters == 0 {
            return Err(Error::Config("topics.n_clusters must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.topics.keyword_decay) {
            return Err(Error::Config("topics.keyword_decay must be in [0, 1)".into()));
        }
        if self.embedder.dimensions == Some(0) {
            return Err(Error::Config("embedder.dimensions must be at least 1".into()));
        }
        if self.embedder.kind == EmbedderKind::OpenAi
            && self.embedder.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(Error::Config(
                "the openai embedder needs an API key (PAPERTOPICS_EMBEDDING_API_KEY or OPENAI_API_KEY)"
                    .into(),
            ));
        }

        render_template(&self.harvest.info_url_template, "q", None)
            .and_then(|_| render_template(&self.harvest.page_url_template, "q", Some(1)))
            .map_err(|e| Error::Config(e.to_string()))?;
        self.harvest
            .pagination_schema
            .validate()
            .and_then(|()| self.harvest.record_schema.validate())
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{ENV_PREFIX}{name} has invalid value '{value}'")))
}
