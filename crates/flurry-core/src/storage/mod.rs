//! Multi-cloud storage abstraction.
//!
//! Wraps an `ObjectStore` (S3, GCS, Azure or the local filesystem) together
//! with a key prefix. Every path handed in or out of a `StorageProvider` is
//! relative to that prefix, and every request records storage metrics.

mod azure;
mod gcs;
mod local;
mod s3;
mod url_parser;

pub use azure::AzureConfig;
pub use gcs::GcsConfig;
pub use local::LocalConfig;
pub use s3::S3Config;
pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Streamed body of an object together with its metadata.
pub struct ObjectDownload {
    /// Metadata as reported by the GET response, location relative to the prefix.
    pub meta: ObjectMeta,
    /// Body chunks in order.
    pub stream: BoxStream<'static, Result<Bytes, object_store::Error>>,
}

impl std::fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    object_store: Arc<dyn ObjectStore>,
    prefix: Option<Path>,
    canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL.
    ///
    /// `options` are backend config keys (`aws_region`, `google_service_account`,
    /// `azure_storage_account_key`, ...) applied on top of the environment.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, &options),
            BackendConfig::Gcs(config) => Self::construct_gcs(config, &options),
            BackendConfig::Azure(config) => Self::construct_azure(config, &options),
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Wrap an already authenticated store.
    ///
    /// This is the entry point for embedders that manage credentials
    /// themselves; `prefix` scopes all paths the provider sees.
    pub fn from_store(
        object_store: Arc<dyn ObjectStore>,
        prefix: Option<Path>,
        canonical_url: impl Into<String>,
    ) -> Self {
        Self {
            object_store,
            prefix,
            canonical_url: canonical_url.into(),
        }
    }

    /// The URL this provider was built for.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    fn relativize(&self, mut meta: ObjectMeta) -> ObjectMeta {
        let skip = self.prefix.as_ref().map_or(0, |p| p.parts().count());
        meta.location = meta.location.parts().skip(skip).collect();
        meta
    }

    /// List objects below the prefix with their metadata.
    ///
    /// Backend pagination is drained here so callers get the complete
    /// listing or an error. With `recursive` false only direct children of
    /// the prefix are returned. Locations are relative to the prefix.
    pub async fn list_objects(&self, recursive: bool) -> Result<Vec<ObjectMeta>, StorageError> {
        let start = Instant::now();
        let result = if recursive {
            self.object_store
                .list(self.prefix.as_ref())
                .try_collect::<Vec<_>>()
                .await
        } else {
            self.object_store
                .list_with_delimiter(self.prefix.as_ref())
                .await
                .map(|listing| listing.objects)
        };

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        let objects = result.context(ObjectStoreSnafu)?;
        Ok(objects.into_iter().map(|m| self.relativize(m)).collect())
    }

    /// Open a streaming download of an object.
    pub async fn get_stream(&self, path: &Path) -> Result<ObjectDownload, StorageError> {
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(path)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        let response = result.context(ObjectStoreSnafu)?;
        let meta = self.relativize(response.meta.clone());
        Ok(ObjectDownload {
            meta,
            stream: response.into_stream(),
        })
    }

    /// Get the full contents of an object.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let download = self.get_stream(&path).await?;
        let chunks: Vec<Bytes> = download
            .stream
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(chunks.concat().into())
    }

    /// Put bytes to a path.
    pub async fn put(&self, path: impl Into<Path>, bytes: impl Into<Bytes>) -> Result<(), StorageError> {
        let path = path.into();
        self.put_payload(&path, PutPayload::from(bytes.into())).await
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .put(&self.qualify_path(path), payload)
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete the object at the given path.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.object_store.delete(&self.qualify_path(path)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Delete,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Server-side rename (move).
    ///
    /// GCS and Azure copy server-side, S3 issues `CopyObject` + `DeleteObject`,
    /// the local filesystem uses `rename(2)`. No data leaves the backend.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .rename(&self.qualify_path(from), &self.qualify_path(to))
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Rename,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Write content to `{path}.tmp`, then rename it over `path`.
    ///
    /// The target is either the previous content or the complete new
    /// content, never a partial write.
    pub async fn atomic_write(&self, path: &Path, content: Vec<u8>) -> Result<(), StorageError> {
        let temp_path = Path::from(format!("{path}.tmp"));
        self.put_payload(&temp_path, PutPayload::from(content))
            .await?;
        self.rename(&temp_path, path).await
    }
}
