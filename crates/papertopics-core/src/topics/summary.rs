use std::collections::BTreeMap;

use super::traits::TopicLabel;
use crate::record::{TopicId, TopicInfo, OUTLIER_TOPIC};

/// Builds the per-topic table: every labeled topic plus every id that was
/// actually assigned, in ascending id order, with assignment counts.
pub fn summarize(assignments: &[TopicId], labels: &BTreeMap<TopicId, TopicLabel>) -> Vec<TopicInfo> {
    let mut counts: BTreeMap<TopicId, usize> = labels.keys().map(|id| (*id, 0)).collect();
    for topic in assignments {
        *counts.entry(*topic).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(topic, count)| {
            let (name, representation) = match labels.get(&topic) {
                Some(label) => (label.name.clone(), label.representation.clone()),
                None if topic == OUTLIER_TOPIC => (format!("{OUTLIER_TOPIC}_outliers"), Vec::new()),
                None => (topic.to_string(), Vec::new()),
            };
            TopicInfo {
                topic,
                count,
                name,
                representation,
            }
        })
        .collect()
}
