use async_trait::async_trait;
use snafu::ResultExt;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use super::EventSink;
use crate::error::{EmitError, EncodeSnafu, WriteSnafu};
use crate::event::OutboundEvent;

/// Writes each event as one line of JSON.
pub struct NdjsonSink<W> {
    writer: Mutex<W>,
}

/// NDJSON on the process's stdout.
pub type StdoutSink = NdjsonSink<Stdout>;

impl StdoutSink {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventSink for NdjsonSink<W> {
    async fn publish(&self, event: OutboundEvent) -> Result<(), EmitError> {
        let mut line = serde_json::to_vec(&event).context(EncodeSnafu)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.context(WriteSnafu)?;
        writer.flush().await.context(WriteSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventMetadata, EventPayload};
    use chrono::Utc;
    use std::path::PathBuf;

    fn event(key: &str) -> OutboundEvent {
        OutboundEvent {
            payload: EventPayload::Path(PathBuf::from(format!("/spool/{key}"))),
            metadata: EventMetadata {
                origin_key: key.to_string(),
                remote_dir: "s3://bucket/in".to_string(),
                local_path: PathBuf::from(format!("/spool/{key}")),
                size: 1,
                timestamp: Utc::now(),
                line_number: None,
            },
        }
    }

    #[tokio::test]
    async fn test_one_line_per_event() {
        let sink = NdjsonSink::new(Vec::<u8>::new());
        sink.publish(event("a.csv")).await.unwrap();
        sink.publish(event("b.csv")).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["payload"]["type"], "path");
        assert_eq!(first["payload"]["value"], "/spool/a.csv");
        assert_eq!(first["metadata"]["origin_key"], "a.csv");
    }
}
