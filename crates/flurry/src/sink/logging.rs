use async_trait::async_trait;
use tracing::info;

use super::EventSink;
use crate::error::EmitError;
use crate::event::{EventPayload, OutboundEvent};

/// Logs each event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, event: OutboundEvent) -> Result<(), EmitError> {
        let meta = &event.metadata;
        let kind = match &event.payload {
            EventPayload::Path(_) => "path",
            EventPayload::Bytes(_) => "bytes",
            EventPayload::Lines(_) => "lines",
            EventPayload::Line(_) => "line",
            EventPayload::Marker { .. } => "marker",
        };
        info!(
            origin_key = %meta.origin_key,
            remote_dir = %meta.remote_dir,
            local_path = %meta.local_path.display(),
            size = meta.size,
            line_number = ?meta.line_number,
            payload = kind,
            "File ready"
        );
        Ok(())
    }
}
