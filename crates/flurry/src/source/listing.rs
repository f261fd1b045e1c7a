//! Listing the remote directory.

use std::sync::Arc;

use snafu::ResultExt;
use tracing::debug;

use flurry_core::emit;
use flurry_core::metrics::events::ObjectsListed;

use super::{RemoteObjectRef, RemoteStore};
use crate::error::{BackendUnavailableSnafu, SyncError};

/// Lists the objects under a poller's remote directory.
pub struct RemoteObjectLister {
    store: Arc<dyn RemoteStore>,
    recursive: bool,
    exclude_prefix: Option<String>,
    target: String,
}

impl RemoteObjectLister {
    pub fn new(store: Arc<dyn RemoteStore>, recursive: bool, target: impl Into<String>) -> Self {
        Self {
            store,
            recursive,
            exclude_prefix: None,
            target: target.into(),
        }
    }

    /// Skip keys below `prefix`. Used to keep an archive directory inside
    /// `remote_dir` out of recursive listings.
    pub fn excluding(mut self, prefix: Option<String>) -> Self {
        self.exclude_prefix = prefix;
        self
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// All objects under the remote directory, in backend order.
    pub async fn list(&self) -> Result<Vec<RemoteObjectRef>, SyncError> {
        let mut objects = self
            .store
            .list(self.recursive)
            .await
            .context(BackendUnavailableSnafu {
                key: self.store.describe(),
            })?;

        if let Some(prefix) = &self.exclude_prefix {
            objects.retain(|object| !object.key().starts_with(prefix.as_str()));
        }

        debug!(
            target = %self.target,
            count = objects.len(),
            remote_dir = self.store.describe(),
            "Listed remote objects"
        );
        emit!(ObjectsListed {
            count: objects.len() as u64,
            target: self.target.clone(),
        });
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flurry_core::StorageProvider;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn lister(dir: &TempDir, recursive: bool) -> RemoteObjectLister {
        let storage =
            StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
                .await
                .unwrap();
        RemoteObjectLister::new(Arc::new(storage), recursive, "test")
    }

    #[tokio::test]
    async fn test_list_direct_children() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/d.txt"), "d").unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }

        let mut objects = lister(&dir, false).await.list().await.unwrap();
        objects.sort_by(|a, b| a.key().cmp(b.key()));
        let keys: Vec<&str> = objects.iter().map(|o| o.key()).collect();
        assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(objects[0].size, 5);
    }

    #[tokio::test]
    async fn test_recursive_excludes_archive() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::create_dir_all(dir.path().join("done")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("done/old.txt"), "o").unwrap();

        let mut objects = lister(&dir, true)
            .await
            .excluding(Some("done/".to_string()))
            .list()
            .await
            .unwrap();
        objects.sort_by(|a, b| a.key().cmp(b.key()));
        let keys: Vec<&str> = objects.iter().map(|o| o.key()).collect();
        assert_eq!(keys, vec!["a.txt", "sub/b.txt"]);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let objects = lister(&dir, false).await.list().await.unwrap();
        assert!(objects.is_empty());
    }
}
