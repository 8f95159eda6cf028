use serde::{Deserialize, Serialize};

/// Topic identifier as returned by the clustering capability.
pub type TopicId = i64;

/// Reserved id for records that did not fit any discovered topic.
pub const OUTLIER_TOPIC: TopicId = -1;

/// One bibliographic entry. Scraped entries may lack either field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Record {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// One row of the topic summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    #[serde(rename = "Topic")]
    pub topic: TopicId,
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Representation", default)]
    pub representation: Vec<String>,
}

impl TopicInfo {
    #[must_use]
    pub const fn is_outlier(&self) -> bool {
        self.topic == OUTLIER_TOPIC
    }
}

/// Persisted payload of the clustering stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringResults {
    pub clusters: Vec<TopicId>,
    pub topic_info: Vec<TopicInfo>,
}

impl ClusteringResults {
    pub fn topic_count(&self) -> usize {
        self.topic_info.len()
    }

    pub fn topic_names(&self) -> impl Iterator<Item = &str> {
        self.topic_info.iter().map(|t| t.name.as_str())
    }
}
