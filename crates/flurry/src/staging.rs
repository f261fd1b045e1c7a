//! Local staging of remote objects.
//!
//! Every download goes to `<name><tmp_file_suffix>` first and is renamed to
//! its final name only once the byte count matches the listing and the data
//! is on disk. A file under its final name is therefore always complete.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flurry_core::emit;
use flurry_core::error::StorageError;
use flurry_core::metrics::events::FileStaged;

use crate::config::PollerConfig;
use crate::error::{
    BackendUnavailableSnafu, CancelledSnafu, LocalDirUnavailableSnafu, LocalWriteSnafu, SyncError,
    TransferIncompleteSnafu,
};
use crate::source::RemoteObjectRef;

/// A remote object that now exists, complete, under its final local name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedFile {
    pub local_path: PathBuf,
    pub remote_key: String,
    pub size: u64,
    /// Remote last-modified time when timestamps are preserved, otherwise
    /// the time of the rename.
    pub timestamp: DateTime<Utc>,
}

/// Removes a temp file when dropped unless disarmed.
///
/// Error paths call [`discard`](Self::discard); the drop only covers futures
/// abandoned mid-transfer.
struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }

    async fn discard(mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

/// Downloads remote objects into a local directory with temp-then-rename.
#[derive(Debug, Clone)]
pub struct LocalStagingWriter {
    local_dir: PathBuf,
    tmp_file_suffix: String,
    separator: String,
    recursive: bool,
    preserve_timestamp: bool,
    auto_create_local_dir: bool,
    target: String,
}

impl LocalStagingWriter {
    pub fn new(config: &PollerConfig, target: impl Into<String>) -> Self {
        Self {
            local_dir: PathBuf::from(&config.local_dir),
            tmp_file_suffix: config.tmp_file_suffix.clone(),
            separator: config.remote_file_separator.clone(),
            recursive: config.recursive,
            preserve_timestamp: config.preserve_timestamp,
            auto_create_local_dir: config.auto_create_local_dir,
            target: target.into(),
        }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Make sure `local_dir` exists, creating it if allowed.
    pub async fn ensure_local_dir(&self) -> Result<(), SyncError> {
        match tokio::fs::metadata(&self.local_dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                "local_dir exists but is not a directory",
            ))
            .context(LocalDirUnavailableSnafu {
                path: &self.local_dir,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.auto_create_local_dir => {
                tokio::fs::create_dir_all(&self.local_dir)
                    .await
                    .context(LocalDirUnavailableSnafu {
                        path: &self.local_dir,
                    })?;
                debug!(target = %self.target, path = %self.local_dir.display(), "Created local directory");
                Ok(())
            }
            Err(e) => Err(e).context(LocalDirUnavailableSnafu {
                path: &self.local_dir,
            }),
        }
    }

    /// Remove temp files left behind by an earlier run, anywhere below
    /// `local_dir`. Returns how many were removed.
    ///
    /// Only safe before this writer stages anything.
    pub async fn sweep_temp_files(&self) -> Result<usize, SyncError> {
        let mut removed = 0;
        let mut pending = vec![self.local_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e).context(LocalDirUnavailableSnafu { path: dir }),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .context(LocalDirUnavailableSnafu { path: &dir })?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .context(LocalDirUnavailableSnafu { path: &path })?;
                if file_type.is_dir() {
                    if self.recursive {
                        pending.push(path);
                    }
                } else if file_type.is_file()
                    && entry
                        .file_name()
                        .to_string_lossy()
                        .ends_with(self.tmp_file_suffix.as_str())
                {
                    tokio::fs::remove_file(&path)
                        .await
                        .context(LocalWriteSnafu { path: &path })?;
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(target = %self.target, removed, "Removed leftover temp files");
        }
        Ok(removed)
    }

    /// Final local path for an object.
    ///
    /// Direct children land at `local_dir/<basename>`. Recursive listings
    /// mirror the key's segments below `local_dir`.
    pub fn local_path(&self, object: &RemoteObjectRef) -> Result<PathBuf, SyncError> {
        let segments: Vec<&str> = if self.recursive {
            object.key().split(self.separator.as_str()).collect()
        } else {
            vec![object.basename(&self.separator)]
        };

        let mut path = self.local_dir.clone();
        for segment in segments {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("key '{}' cannot be mapped to a local file", object.key()),
                ))
                .context(LocalWriteSnafu { path });
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Stream `body` into the staging area and atomically publish it.
    ///
    /// The transfer races `cancel`; a cancelled transfer leaves no temp file.
    pub async fn stage(
        &self,
        object: &RemoteObjectRef,
        body: BoxStream<'static, Result<Bytes, object_store::Error>>,
        cancel: &CancellationToken,
    ) -> Result<StagedFile, SyncError> {
        let start = Instant::now();
        self.ensure_local_dir().await?;

        let final_path = self.local_path(object)?;
        if let Some(parent) = final_path.parent()
            && parent != self.local_dir.as_path()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context(LocalWriteSnafu { path: parent })?;
        }

        let mut tmp_name = final_path.clone().into_os_string();
        tmp_name.push(&self.tmp_file_suffix);
        let tmp_path = PathBuf::from(tmp_name);
        let mut guard = TempFileGuard::new(tmp_path.clone());

        let result = match cancel
            .run_until_cancelled(write_body(&tmp_path, object.key(), body))
            .await
        {
            Some(result) => result,
            None => CancelledSnafu { key: object.key() }.fail(),
        };
        let written = match result {
            Ok(written) if written == object.size => written,
            Ok(written) => {
                guard.discard().await;
                return TransferIncompleteSnafu {
                    key: object.key(),
                    expected: object.size,
                    actual: written,
                }
                .fail();
            }
            Err(e) => {
                guard.discard().await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            guard.discard().await;
            return Err(e).context(LocalWriteSnafu { path: &final_path });
        }
        guard.disarm();

        let timestamp = if self.preserve_timestamp {
            if let Err(e) = set_modified(&final_path, object.last_modified).await {
                warn!(
                    target = %self.target,
                    path = %final_path.display(),
                    error = %e,
                    "Failed to preserve remote timestamp"
                );
            }
            object.last_modified
        } else {
            Utc::now()
        };

        emit!(FileStaged {
            bytes: written,
            duration: start.elapsed(),
            target: self.target.clone(),
        });
        debug!(
            target = %self.target,
            key = object.key(),
            path = %final_path.display(),
            bytes = written,
            "Staged file"
        );

        Ok(StagedFile {
            local_path: final_path,
            remote_key: object.key().to_string(),
            size: written,
            timestamp,
        })
    }
}

/// Write every chunk to `path`, sync, and return the byte count.
async fn write_body(
    path: &Path,
    key: &str,
    mut body: BoxStream<'static, Result<Bytes, object_store::Error>>,
) -> Result<u64, SyncError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .context(LocalWriteSnafu { path })?;

    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|source| StorageError::ObjectStore { source })
            .context(BackendUnavailableSnafu { key })?;
        file.write_all(&chunk)
            .await
            .context(LocalWriteSnafu { path })?;
        written += chunk.len() as u64;
    }

    file.flush().await.context(LocalWriteSnafu { path })?;
    file.sync_all().await.context(LocalWriteSnafu { path })?;
    Ok(written)
}

async fn set_modified(path: &Path, modified: DateTime<Utc>) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let modified = SystemTime::from(modified);
    tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)?
            .set_modified(modified)
    })
    .await
    .map_err(std::io::Error::other)?
}
