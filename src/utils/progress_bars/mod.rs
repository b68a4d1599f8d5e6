// src/utils/progress_bars/mod.rs
pub mod logging;
pub mod progress_config;

pub use logging::{log_pipeline_completion, log_pipeline_start, Stage, StageLogger};
pub use progress_config::ProgressConfig;
