pub mod config;
pub mod error;
pub mod harvest;
pub mod pipeline;
pub mod record;
pub mod stage;
pub mod text;
pub mod topics;

pub use config::{EmbedderConfig, EmbedderKind, PipelineConfig};
pub use error::{Error, Result};
pub use harvest::{
    ExtractedItem, ExtractionSchema, FetchError, FetchResult, FieldSpec, Harvester,
    HttpPageFetcher, PageFetcher,
};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineReport};
pub use record::{ClusteringResults, Record, TopicId, TopicInfo, OUTLIER_TOPIC};
pub use stage::{
    AlwaysRecompute, AlwaysReuse, ConsolePrompt, RegenerationPolicy, StageCache, StageDecision,
    StageError, StageResult,
};
pub use text::{dedupe, Normalizer, PreprocessStats, Preprocessor, StopwordError, StopwordSet};
pub use topics::{
    ClustererFactory, Embedder, HashingEmbedder, HttpEmbedder, IncrementalTopicModel,
    KMeansFactory, ModelOrigin, OnlineKMeans, TopicBatch, TopicClusterer, TopicError,
    TopicLabel, TopicModelOutput, TopicResult,
};
