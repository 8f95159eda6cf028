//! Compute-or-reuse gates around the pipeline's persisted artifacts.
//!
//! Each stage writes one JSON artifact. On later runs a [`RegenerationPolicy`]
//! decides whether an existing artifact is reused as-is or recomputed.

use std::future::Future;
use std::io::{BufRead, BufReader, Stderr, Stdin, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::RuntimeFlavor;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Stage '{stage}' failed: {source}")]
    Compute {
        stage: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact at {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDecision {
    Reuse,
    Recompute,
}

/// Decides what to do with a stage whose artifact may already exist.
pub trait RegenerationPolicy: Send + Sync {
    fn decide(&self, stage: &str, artifact_exists: bool) -> StageDecision;
}

/// Never recomputes an existing artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReuse;

impl RegenerationPolicy for AlwaysReuse {
    fn decide(&self, _stage: &str, artifact_exists: bool) -> StageDecision {
        if artifact_exists {
            StageDecision::Reuse
        } else {
            StageDecision::Recompute
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRecompute;

impl RegenerationPolicy for AlwaysRecompute {
    fn decide(&self, _stage: &str, _artifact_exists: bool) -> StageDecision {
        StageDecision::Recompute
    }
}

/// Asks on the console whether an existing artifact should be regenerated.
/// `y` or `yes` (any case) recomputes; anything else, including EOF or a
/// read error, reuses.
pub struct ConsolePrompt<R, W> {
    io: Mutex<(R, W)>,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    fn ask(&self, stage: &str) -> StageDecision {
        let Ok(mut guard) = self.io.lock() else {
            return StageDecision::Reuse;
        };
        let (input, output) = &mut *guard;

        if write!(output, "Regenerate {stage}? (y/n) ")
            .and_then(|()| output.flush())
            .is_err()
        {
            return StageDecision::Reuse;
        }

        let mut answer = String::new();
        match blocking(|| input.read_line(&mut answer)) {
            Ok(_) if is_yes(&answer) => StageDecision::Recompute,
            _ => StageDecision::Reuse,
        }
    }
}

impl ConsolePrompt<BufReader<Stdin>, Stderr> {
    /// Prompt on stderr, read the answer from stdin.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stderr())
    }
}

impl<R, W> RegenerationPolicy for ConsolePrompt<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn decide(&self, stage: &str, artifact_exists: bool) -> StageDecision {
        if artifact_exists {
            self.ask(stage)
        } else {
            StageDecision::Recompute
        }
    }
}

/// Runs a blocking read without stalling the other workers of a
/// multi-thread runtime.
fn blocking<T>(read: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(read)
        }
        _ => read(),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Runs pipeline stages through their persisted artifacts.
pub struct StageCache {
    policy: Box<dyn RegenerationPolicy>,
}

impl StageCache {
    pub fn new(policy: Box<dyn RegenerationPolicy>) -> Self {
        Self { policy }
    }

    /// Returns the artifact at `path` when it exists and the policy reuses it;
    /// otherwise awaits `compute`, persists its value and returns it. An
    /// artifact that cannot be parsed is recomputed. Nothing is written when
    /// `compute` fails.
    pub async fn run<T, F, Fut, E>(&self, stage: &str, path: &Path, compute: F) -> StageResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run_validated(stage, path, |_| true, compute).await
    }

    /// Like [`StageCache::run`], but a parsed artifact rejected by `is_valid`
    /// is also recomputed.
    pub async fn run_validated<T, V, F, Fut, E>(
        &self,
        stage: &str,
        path: &Path,
        is_valid: V,
        compute: F,
    ) -> StageResult<T>
    where
        T: Serialize + DeserializeOwned,
        V: FnOnce(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let exists = path.exists();
        let decision = self.policy.decide(stage, exists);

        if exists && decision == StageDecision::Reuse {
            match load_artifact(path) {
                Ok(value) if is_valid(&value) => {
                    tracing::info!(stage, path = %path.display(), "Reusing existing artifact");
                    return Ok(value);
                }
                Ok(_) => {
                    tracing::warn!(
                        stage,
                        path = %path.display(),
                        "Existing artifact does not match its inputs, recomputing"
                    );
                }
                Err(StageError::Serialization { source, .. }) => {
                    tracing::warn!(
                        stage,
                        path = %path.display(),
                        error = %source,
                        "Existing artifact is invalid, recomputing"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(stage, "Computing stage");
        let value = compute().await.map_err(|e| StageError::Compute {
            stage: stage.to_string(),
            source: Box::new(e),
        })?;

        write_artifact(path, &value)?;
        tracing::info!(stage, path = %path.display(), "Saved artifact");
        Ok(value)
    }
}

pub fn load_artifact<T: DeserializeOwned>(path: &Path) -> StageResult<T> {
    let bytes = std::fs::read(path).map_err(|e| StageError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| StageError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed JSON, written to a sibling file and renamed over `path`.
pub fn write_artifact<T: Serialize>(path: &Path, value: &T) -> StageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StageError::io(parent, e))?;
    }

    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StageError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes).map_err(|e| StageError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| StageError::io(path, e))
}
