use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

const ENGLISH: &str = include_str!("stopwords/english.txt");
const INDONESIAN: &str = include_str!("stopwords/indonesian.txt");

#[derive(Debug, Error)]
pub enum StopwordError {
    #[error("Stopword file not found: {0}")]
    Missing(PathBuf),
    #[error("Stopword set '{0}' contains no words")]
    Empty(String),
    #[error("No stopword sets configured")]
    NoSets,
    #[error("Unknown built-in stopword set: {0}")]
    UnknownBuiltin(String),
    #[error("Failed to read stopword file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type StopwordResult<T> = Result<T, StopwordError>;

/// A named vocabulary of tokens dropped during normalization.
#[derive(Debug, Clone)]
pub struct StopwordSet {
    name: String,
    words: HashSet<String>,
}

impl StopwordSet {
    /// Builds a set from raw words; entries are trimmed and lower-cased and
    /// blank entries are skipped.
    pub fn from_words<I, S>(name: impl Into<String>, words: I) -> StopwordResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let words: HashSet<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty() && !w.starts_with('#'))
            .collect();

        if words.is_empty() {
            return Err(StopwordError::Empty(name));
        }

        Ok(Self { name, words })
    }

    /// NLTK's English list.
    #[must_use]
    pub fn english() -> Self {
        Self::builtin("english", ENGLISH)
    }

    /// Sastrawi's Indonesian list.
    #[must_use]
    pub fn indonesian() -> Self {
        Self::builtin("indonesian", INDONESIAN)
    }

    pub fn by_name(name: &str) -> StopwordResult<Self> {
        match name.to_lowercase().as_str() {
            "english" | "en" => Ok(Self::english()),
            "indonesian" | "id" => Ok(Self::indonesian()),
            other => Err(StopwordError::UnknownBuiltin(other.to_string())),
        }
    }

    /// Loads a newline-delimited word list. Lines starting with `#` are comments.
    pub fn from_file(path: &Path) -> StopwordResult<Self> {
        if !path.exists() {
            return Err(StopwordError::Missing(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| StopwordError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().to_string());

        Self::from_words(name, content.lines())
    }

    fn builtin(name: &str, list: &str) -> Self {
        Self {
            name: name.to_string(),
            words: list
                .lines()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub(crate) fn into_words(self) -> HashSet<String> {
        self.words
    }
}
