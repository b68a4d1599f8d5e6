use anyhow::{Context, Result};
use log::info;
use mention_graph_lib::pipeline::run_pipeline;
use mention_graph_lib::utils::config::PipelineConfig;
use mention_graph_lib::utils::env::load_env;
use mention_graph_lib::utils::get_memory_usage;
use mention_graph_lib::utils::progress_bars::ProgressConfig;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging and environment
    env_logger::init();
    info!("Starting mention graph pipeline");
    load_env();

    let config = PipelineConfig::from_env();
    config.log_config();

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );

    let start_time = Instant::now();
    let summary = run_pipeline(&config, &progress_config)
        .await
        .context("Mention graph pipeline failed")?;

    info!(
        "Run {} finished in {:.2?}: {} member lists, {} edges, {} skipped records",
        summary.run_id,
        start_time.elapsed(),
        summary.member_lists,
        summary.edges,
        summary.errors.total()
    );
    info!(
        "Outputs written to {} (memory: {} MB)",
        config.output_dir.display(),
        get_memory_usage().await
    );
    Ok(())
}
