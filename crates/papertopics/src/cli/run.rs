use anyhow::Result;
use console::style;
use papertopics_core::{
    AlwaysRecompute, AlwaysReuse, ConsolePrompt, Pipeline, PipelineConfig, PipelineOutcome,
    RegenerationPolicy,
};

use super::RunArgs;

pub async fn run(mut config: PipelineConfig, args: &RunArgs) -> Result<()> {
    args.apply(&mut config);

    let pipeline = Pipeline::from_config(config, policy(args))?;

    match pipeline.run().await? {
        PipelineOutcome::Completed(report) => {
            eprintln!(
                "{} {} topics from {} records ({} scraped) in {} ms",
                style("●").green(),
                report.topic_count(),
                report.preprocessed_records,
                report.raw_records,
                report.duration_ms
            );
            eprintln!(
                "  Results: {}",
                pipeline.config().clustering_path().display()
            );
        }
        PipelineOutcome::EmptyInput => {
            eprintln!("{} Nothing to cluster", style("○").dim());
        }
    }

    Ok(())
}

fn policy(args: &RunArgs) -> Box<dyn RegenerationPolicy> {
    if args.reuse {
        Box::new(AlwaysReuse)
    } else if args.regenerate {
        Box::new(AlwaysRecompute)
    } else {
        Box::new(ConsolePrompt::stdio())
    }
}
