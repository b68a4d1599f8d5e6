// src/pipeline/mod.rs
pub mod io;
pub mod ledger;
pub mod manager;
pub mod stage;

// Re-export main pipeline API
pub use ledger::ErrorLedger;
pub use manager::{run_pipeline, run_with_records, PipelineOutput, RunSummary};
pub use stage::{funnel_to_single_partition, run_map_stage, shuffle};
