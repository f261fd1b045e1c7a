//! Keys already transferred by a poller.
//!
//! The set lives in memory. When a `seen_state` location is configured it is
//! loaded on the first cycle and stored at `{uri}/{poller}_seen.json` after
//! each cycle that staged files, using a temp-then-rename write so the stored
//! state is never partial.

use chrono::Utc;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use flurry_core::StorageProvider;
use flurry_core::emit;
use flurry_core::metrics::events::{SeenSetSize, SeenStateSaved};

use crate::config::PollerKey;
use crate::error::{DecodeSnafu, EncodeStateSnafu, SeenStateError, SeenStorageSnafu};

/// On-disk form of the seen set.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenState {
    keys: BTreeSet<String>,
    last_update_ts: i64,
}

/// Keys that must never be transferred again by this poller.
pub struct SeenSet {
    keys: HashSet<String>,
    storage: Option<Arc<StorageProvider>>,
    path: Path,
    target: String,
}

impl SeenSet {
    /// An in-memory set that is lost on restart.
    pub fn in_memory(poller: &PollerKey) -> Self {
        Self {
            keys: HashSet::new(),
            storage: None,
            path: Self::state_path(poller),
            target: poller.to_string(),
        }
    }

    /// A set persisted under `storage`.
    pub fn persistent(storage: Arc<StorageProvider>, poller: &PollerKey) -> Self {
        Self {
            storage: Some(storage),
            ..Self::in_memory(poller)
        }
    }

    fn state_path(poller: &PollerKey) -> Path {
        Path::from(format!("{}_seen.json", poller.file_stem()))
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Record a key. Returns false if it was already present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Load persisted keys, replacing the in-memory set.
    ///
    /// Returns `Ok(true)` if state was loaded, `Ok(false)` if there is no
    /// persistence or no state yet. A state object that cannot be decoded is
    /// an error: starting empty would re-transfer everything.
    pub async fn load(&mut self) -> Result<bool, SeenStateError> {
        let Some(storage) = &self.storage else {
            return Ok(false);
        };

        match storage.get(self.path.clone()).await {
            Ok(bytes) => {
                let state: SeenState = serde_json::from_slice(&bytes).context(DecodeSnafu)?;
                self.keys = state.keys.into_iter().collect();
                info!(
                    target = %self.target,
                    keys = self.keys.len(),
                    last_update_ts = state.last_update_ts,
                    "Loaded seen state"
                );
                emit!(SeenSetSize {
                    count: self.keys.len(),
                    target: self.target.clone(),
                });
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                debug!(target = %self.target, "No seen state found, starting fresh");
                Ok(false)
            }
            Err(e) => Err(e).context(SeenStorageSnafu),
        }
    }

    /// Store the set if persistence is configured.
    pub async fn save(&self) -> Result<(), SeenStateError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        let state = SeenState {
            keys: self.keys.iter().cloned().collect(),
            last_update_ts: Utc::now().timestamp(),
        };
        let json = serde_json::to_vec_pretty(&state).context(EncodeStateSnafu)?;
        storage
            .atomic_write(&self.path, json)
            .await
            .context(SeenStorageSnafu)?;

        emit!(SeenStateSaved {
            target: self.target.clone(),
        });
        debug!(target = %self.target, keys = self.keys.len(), "Saved seen state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn storage(dir: &TempDir) -> Arc<StorageProvider> {
        Arc::new(
            StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
                .await
                .unwrap(),
        )
    }

    #[test]
    fn test_in_memory_insert_contains() {
        let mut seen = SeenSet::in_memory(&PollerKey::new("p"));
        assert!(seen.is_empty());
        assert!(seen.insert("a.csv"));
        assert!(!seen.insert("a.csv"));
        assert!(seen.contains("a.csv"));
        assert!(!seen.contains("b.csv"));
        assert_eq!(seen.len(), 1);
        assert!(!seen.is_persistent());
    }

    #[tokio::test]
    async fn test_in_memory_load_save_are_noops() {
        let mut seen = SeenSet::in_memory(&PollerKey::new("p"));
        seen.insert("a.csv");
        seen.save().await.unwrap();
        assert!(!seen.load().await.unwrap());
        assert!(seen.contains("a.csv"));
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let key = PollerKey::new("eu/invoices");

        let mut seen = SeenSet::persistent(storage(&dir).await, &key);
        seen.insert("a.csv");
        seen.insert("b.csv");
        seen.save().await.unwrap();

        assert!(dir.path().join("eu_invoices_seen.json").exists());
        assert!(!dir.path().join("eu_invoices_seen.json.tmp").exists());

        let mut restored = SeenSet::persistent(storage(&dir).await, &key);
        assert!(restored.load().await.unwrap());
        assert_eq!(restored.len(), 2);
        assert!(restored.contains("a.csv"));
        assert!(restored.contains("b.csv"));
    }

    #[tokio::test]
    async fn test_load_without_state() {
        let dir = TempDir::new().unwrap();
        let mut seen = SeenSet::persistent(storage(&dir).await, &PollerKey::new("p"));
        assert!(!seen.load().await.unwrap());
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("p_seen.json"), b"{not json").unwrap();

        let mut seen = SeenSet::persistent(storage(&dir).await, &PollerKey::new("p"));
        let err = seen.load().await.unwrap_err();
        assert!(matches!(err, SeenStateError::Decode { .. }));
    }
}
