//! flurry: polls an object-storage bucket, stages new objects in a local
//! directory and emits each staged file as an event.
//!
//! This crate handles:
//! - Listing and filtering remote objects (`source`, `filter`)
//! - Transferring them with temp-then-rename staging (`staging`)
//! - Deleting or archiving remote originals (`finalize`)
//! - Remembering transferred keys across cycles and restarts (`seen`)
//! - Publishing staged files to an `EventSink` (`emitter`, `sink`)
//! - Running one engine per configured poller (`engine`, `pipeline`)

pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod finalize;
pub mod pipeline;
pub mod seen;
pub mod sink;
pub mod source;
pub mod staging;

pub use config::{Config, PollerConfig, PollerKey};
pub use emitter::FileReadinessEmitter;
pub use engine::{CycleSummary, SynchronizationEngine};
pub use error::{EmitError, PollerError, SyncError};
pub use event::{OutboundEvent, ReadMode};
pub use filter::FileEligibilityFilter;
pub use pipeline::{PollerPipeline, PollerProcessor};
pub use seen::SeenSet;
pub use sink::{ChannelSink, EventSink, LogSink, StdoutSink};
pub use source::{RemoteObjectLister, RemoteObjectRef, RemoteStore};
pub use staging::{LocalStagingWriter, StagedFile};

pub use flurry_core::{
    Application, CliArgs, PipelineContext, StorageProvider, StorageProviderRef, init_metrics,
    init_tracing, run_pipelines, shutdown_signal,
};
