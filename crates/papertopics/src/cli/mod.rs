pub mod config;
pub mod run;
pub mod topics;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use papertopics_core::{EmbedderKind, PipelineConfig};

#[derive(Parser)]
#[command(
    name = "papertopics",
    about = "Harvest academic search results and group them into topics",
    version
)]
pub struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory that data, results and model paths are relative to
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape, preprocess and cluster
    Run(RunArgs),
    /// Print the saved topic summary
    Topics,
    /// Print the resolved configuration as JSON
    Config,
}

#[derive(Args)]
pub struct RunArgs {
    /// Search query
    #[arg(short, long)]
    pub query: Option<String>,
    /// Fetch at most this many result pages
    #[arg(long)]
    pub max_pages: Option<u32>,
    /// Reuse every existing artifact without asking
    #[arg(long, conflicts_with = "regenerate")]
    pub reuse: bool,
    /// Recompute every stage without asking
    #[arg(long)]
    pub regenerate: bool,
    /// Embedding backend (hashing or openai)
    #[arg(long)]
    pub embedder: Option<EmbedderKind>,
    /// Records per training batch
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Number of topics to discover
    #[arg(long)]
    pub clusters: Option<usize>,
}

impl Cli {
    /// Config file and environment first, then the global flags.
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(root) = &self.root {
            config.root.clone_from(root);
        }
        Ok(config)
    }
}

impl RunArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(query) = &self.query {
            config.query.clone_from(query);
        }
        if self.max_pages.is_some() {
            config.max_pages = self.max_pages;
        }
        if let Some(kind) = self.embedder {
            config.embedder.kind = kind;
        }
        if let Some(size) = self.batch_size {
            config.topics.batch_size = size;
        }
        if let Some(clusters) = self.clusters {
            config.topics.n_clusters = clusters;
        }
    }
}
