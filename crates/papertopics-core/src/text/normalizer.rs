use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::stopwords::{StopwordError, StopwordResult, StopwordSet};

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("non-word pattern"));

/// Canonicalizes free text for deduplication and embedding.
///
/// Output is lower-case and contains only word characters separated by single
/// spaces, with digits and stopwords removed, so normalizing twice is the same
/// as normalizing once.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stopwords: HashSet<String>,
    set_names: Vec<String>,
}

impl Normalizer {
    /// Unions every supplied vocabulary. At least one set is required.
    pub fn new(sets: Vec<StopwordSet>) -> StopwordResult<Self> {
        if sets.is_empty() {
            return Err(StopwordError::NoSets);
        }

        let set_names = sets.iter().map(|s| s.name().to_string()).collect();
        let stopwords = sets.into_iter().flat_map(StopwordSet::into_words).collect();

        Ok(Self {
            stopwords,
            set_names,
        })
    }

    /// English and Indonesian, the vocabularies of the source site.
    #[must_use]
    pub fn bilingual() -> Self {
        let sets = [StopwordSet::indonesian(), StopwordSet::english()];
        Self {
            set_names: sets.iter().map(|s| s.name().to_string()).collect(),
            stopwords: sets.into_iter().flat_map(StopwordSet::into_words).collect(),
        }
    }

    pub fn set_names(&self) -> &[String] {
        &self.set_names
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn normalize(&self, text: &str) -> String {
        let text = text.to_lowercase();
        let text = DIGITS.replace_all(text.trim(), "");
        let text = WHITESPACE.replace_all(&text, " ");
        let text = NON_WORD.replace_all(&text, "");

        text.split_whitespace()
            .filter(|token| !self.is_stopword(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::bilingual()
    }
}
