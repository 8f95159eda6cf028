mod embed;
mod kmeans;
mod model;
mod summary;
mod traits;

pub use embed::{HashingEmbedder, HttpEmbedder};
pub use kmeans::{KMeansConfig, KMeansFactory, OnlineKMeans};
pub use model::{IncrementalTopicModel, ModelOrigin, TopicModelOutput};
pub use summary::summarize;
pub use traits::{
    ClustererFactory, Embedder, TopicBatch, TopicClusterer, TopicError, TopicLabel, TopicResult,
};
