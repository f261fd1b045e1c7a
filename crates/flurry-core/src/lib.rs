//! flurry-core: runtime shared by flurry components.
//!
//! - `storage/` - multi-cloud object storage (S3, GCS, Azure, local)
//! - `metrics/` - internal events and the Prometheus endpoint
//! - `config/` - YAML loading, env interpolation, resource conflicts
//! - `topology/` - running many pipelines with shared shutdown
//! - `polling` - the polling loop and `PollingProcessor` trait
//! - `trigger` - fixed-delay and cron poll schedules
//! - `signal` - shutdown signal handling
//! - `app` - `main.rs` boilerplate

pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod polling;
pub mod signal;
pub mod storage;
pub mod topology;
pub mod tracing;
pub mod trigger;

pub use app::{AppConfig, Application};
pub use config::{CliArgs, ComponentKey, ConfigPath, GlobalConfig, Mergeable, MetricsConfig, Resource};
pub use error::{ConfigError, MetricsError, PipelineSetupError, StorageError};
pub use metrics::{
    DEFAULT_METRICS_ADDR, MetricsController, init_global as init_metrics,
    init_test as init_metrics_test,
};
pub use polling::{IterationResult, PollingProcessor, run_polling_loop};
pub use signal::shutdown_signal;
pub use storage::{ObjectDownload, StorageProvider, StorageProviderRef};
pub use topology::{Pipeline, PipelineContext, PipelineRunner, random_jitter, run_pipelines};
pub use crate::tracing::init_tracing;
pub use trigger::Trigger;
