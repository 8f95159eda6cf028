use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::normalizer::Normalizer;
use crate::record::Record;

/// Drops every record whose exact (title, description) pair was already seen,
/// keeping the first occurrence and the original order.
pub fn dedupe(records: Vec<Record>) -> Vec<Record> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(records.len());

    records
        .into_iter()
        .filter(|r| seen.insert((r.title.clone(), r.description.clone())))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessStats {
    pub input: usize,
    pub output: usize,
}

impl PreprocessStats {
    pub const fn duplicates(&self) -> usize {
        self.input.saturating_sub(self.output)
    }
}

/// Normalizes both text fields of every record, then removes exact repeats.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    normalizer: Normalizer,
}

impl Preprocessor {
    #[must_use]
    pub const fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub const fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn clean(&self, record: &Record) -> Record {
        Record {
            title: self.normalizer.normalize(&record.title),
            description: self.normalizer.normalize(&record.description),
        }
    }

    pub fn preprocess(&self, records: &[Record]) -> (Vec<Record>, PreprocessStats) {
        let cleaned = dedupe(records.iter().map(|r| self.clean(r)).collect());

        let stats = PreprocessStats {
            input: records.len(),
            output: cleaned.len(),
        };

        (cleaned, stats)
    }
}
