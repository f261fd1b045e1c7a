//! Inbound boundary to the bucket.

use async_trait::async_trait;
use object_store::path::Path;

use flurry_core::error::StorageError;
use flurry_core::{ObjectDownload, StorageProvider};

use super::RemoteObjectRef;

/// The operations a poller needs from a bucket.
///
/// All paths are relative to the poller's `remote_dir`. The
/// [`StorageProvider`] implementation covers S3, GCS, Azure and the local
/// filesystem; tests wrap it to inject faults.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List objects, draining pagination. Only direct children unless
    /// `recursive`.
    async fn list(&self, recursive: bool) -> Result<Vec<RemoteObjectRef>, StorageError>;

    /// Open a streaming download.
    async fn get_stream(&self, location: &Path) -> Result<ObjectDownload, StorageError>;

    async fn delete(&self, location: &Path) -> Result<(), StorageError>;

    /// Server-side move.
    async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError>;

    /// Human-readable location for logs.
    fn describe(&self) -> &str;
}

#[async_trait]
impl RemoteStore for StorageProvider {
    async fn list(&self, recursive: bool) -> Result<Vec<RemoteObjectRef>, StorageError> {
        let objects = self.list_objects(recursive).await?;
        Ok(objects.into_iter().map(RemoteObjectRef::from).collect())
    }

    async fn get_stream(&self, location: &Path) -> Result<ObjectDownload, StorageError> {
        StorageProvider::get_stream(self, location).await
    }

    async fn delete(&self, location: &Path) -> Result<(), StorageError> {
        StorageProvider::delete(self, location).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        StorageProvider::rename(self, from, to).await
    }

    fn describe(&self) -> &str {
        self.canonical_url()
    }
}
