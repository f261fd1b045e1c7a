//! Orchestration of concurrently running components.

mod pipeline;

pub use pipeline::{Pipeline, PipelineContext, PipelineRunner, random_jitter, run_pipelines};
