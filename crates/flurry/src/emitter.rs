//! Turning staged files into outbound events.

use snafu::ResultExt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use flurry_core::emit;
use flurry_core::metrics::events::{EmitFailed, EventsEmitted};

use crate::config::PollerConfig;
use crate::error::{EmitError, ReadStagedSnafu};
pub use crate::event::ReadMode;
use crate::event::{EventMetadata, EventPayload, Mark, OutboundEvent};
use crate::sink::EventSink;
use crate::staging::StagedFile;

/// Publishes events for staged files according to the read mode.
pub struct FileReadinessEmitter {
    read_mode: ReadMode,
    split_lines: bool,
    with_markers: bool,
    remote_dir: String,
    sink: Arc<dyn EventSink>,
    target: String,
}

impl FileReadinessEmitter {
    pub fn new(config: &PollerConfig, sink: Arc<dyn EventSink>, target: impl Into<String>) -> Self {
        Self {
            read_mode: config.read_mode,
            split_lines: config.split_lines,
            with_markers: config.with_markers,
            remote_dir: config.remote_dir.clone(),
            sink,
            target: target.into(),
        }
    }

    fn metadata(&self, staged: &StagedFile, line_number: Option<u64>) -> EventMetadata {
        EventMetadata {
            origin_key: staged.remote_key.clone(),
            remote_dir: self.remote_dir.clone(),
            local_path: staged.local_path.clone(),
            size: staged.size,
            timestamp: staged.timestamp,
            line_number,
        }
    }

    /// The single event for a staged file read as a whole.
    ///
    /// `ref` carries the path and never reads the file. `binary` carries the
    /// bytes and `lines` every line. Split lines are streamed by [`emit`]
    /// instead.
    ///
    /// [`emit`]: Self::emit
    pub async fn whole_file_event(&self, staged: &StagedFile) -> Result<OutboundEvent, EmitError> {
        let payload = match self.read_mode {
            ReadMode::Ref => EventPayload::Path(staged.local_path.clone()),
            ReadMode::Binary => EventPayload::Bytes(self.read(staged).await?),
            ReadMode::Lines => {
                let bytes = self.read(staged).await?;
                let text = String::from_utf8_lossy(&bytes);
                EventPayload::Lines(text.lines().map(str::to_string).collect())
            }
        };
        Ok(OutboundEvent {
            payload,
            metadata: self.metadata(staged, None),
        })
    }

    async fn read(&self, staged: &StagedFile) -> Result<Vec<u8>, EmitError> {
        tokio::fs::read(&staged.local_path)
            .await
            .context(ReadStagedSnafu {
                path: &staged.local_path,
            })
    }

    /// Build and publish the events for one staged file. Returns how many
    /// were published.
    pub async fn emit(&self, staged: &StagedFile) -> Result<usize, EmitError> {
        let result = self.publish_all(staged).await;
        match &result {
            Ok(count) => {
                emit!(EventsEmitted {
                    count: *count as u64,
                    target: self.target.clone(),
                });
                debug!(
                    target = %self.target,
                    key = %staged.remote_key,
                    events = count,
                    "Emitted file events"
                );
            }
            Err(e) => {
                emit!(EmitFailed {
                    target: self.target.clone(),
                });
                warn!(
                    target = %self.target,
                    key = %staged.remote_key,
                    error = %e,
                    "Failed to emit events for staged file"
                );
            }
        }
        result
    }

    async fn publish_all(&self, staged: &StagedFile) -> Result<usize, EmitError> {
        if self.read_mode == ReadMode::Lines && self.split_lines {
            return self.publish_split_lines(staged).await;
        }
        let event = self.whole_file_event(staged).await?;
        self.sink.publish(event).await?;
        Ok(1)
    }

    async fn publish(
        &self,
        staged: &StagedFile,
        payload: EventPayload,
        line_number: Option<u64>,
    ) -> Result<(), EmitError> {
        self.sink
            .publish(OutboundEvent {
                payload,
                metadata: self.metadata(staged, line_number),
            })
            .await
    }

    /// One event per line, read a line at a time.
    async fn publish_split_lines(&self, staged: &StagedFile) -> Result<usize, EmitError> {
        let path = &staged.local_path;
        let file = tokio::fs::File::open(path)
            .await
            .context(ReadStagedSnafu { path })?;
        let mut reader = BufReader::new(file);
        let mut published = 0;

        if self.with_markers {
            let start = EventPayload::Marker {
                mark: Mark::Start,
                line_count: None,
            };
            self.publish(staged, start, None).await?;
            published += 1;
        }

        let mut buf = Vec::new();
        let mut line_count = 0u64;
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .context(ReadStagedSnafu { path })?;
            if read == 0 {
                break;
            }
            line_count += 1;
            self.publish(staged, EventPayload::Line(decode_line(&buf)), Some(line_count))
                .await?;
            published += 1;
        }

        if self.with_markers {
            let end = EventPayload::Marker {
                mark: Mark::End,
                line_count: Some(line_count),
            };
            self.publish(staged, end, None).await?;
            published += 1;
        }
        Ok(published)
    }
}

/// Strip the line terminator (`\n` or `\r\n`) and decode lossily.
fn decode_line(raw: &[u8]) -> String {
    let line = match raw.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => raw,
    };
    String::from_utf8_lossy(line).into_owned()
}
