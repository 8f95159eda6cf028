use anyhow::{bail, Result};
use console::style;
use papertopics_core::stage::load_artifact;
use papertopics_core::{ClusteringResults, PipelineConfig};

pub fn run(config: &PipelineConfig) -> Result<()> {
    let path = config.clustering_path();
    if !path.exists() {
        bail!(
            "no clustering results at {}; run 'papertopics run' first",
            path.display()
        );
    }

    let results: ClusteringResults = load_artifact(&path)?;

    eprintln!(
        "{} {} topics over {} records",
        style("●").green(),
        results.topic_count(),
        results.clusters.len()
    );
    for info in &results.topic_info {
        let keywords = info.representation.join(", ");
        if info.is_outlier() {
            println!("{:>4}  {:>6}  {}", info.topic, info.count, style(&info.name).dim());
        } else {
            println!("{:>4}  {:>6}  {}  {keywords}", info.topic, info.count, info.name);
        }
    }

    Ok(())
}
