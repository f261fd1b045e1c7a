//! Outbound boundary: where emitted events go.
//!
//! - `channel`: tokio mpsc, for embedding flurry in another process
//! - `ndjson`: one JSON object per line on any async writer (stdout in the binary)
//! - `logging`: one log record per event

mod channel;
mod logging;
mod ndjson;

pub use channel::ChannelSink;
pub use logging::LogSink;
pub use ndjson::{NdjsonSink, StdoutSink};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::SinkConfig;
use crate::error::EmitError;
use crate::event::OutboundEvent;

/// Receives events for staged files.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: OutboundEvent) -> Result<(), EmitError>;
}

/// Build the sink selected in the config.
pub fn from_config(config: SinkConfig) -> Arc<dyn EventSink> {
    match config {
        SinkConfig::Stdout => Arc::new(StdoutSink::stdout()),
        SinkConfig::Log => Arc::new(LogSink),
    }
}
