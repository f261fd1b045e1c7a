//! Cleaning up remote originals after staging.

use object_store::path::Path;
use snafu::ResultExt;
use std::sync::Arc;
use tracing::{debug, warn};

use flurry_core::emit;
use flurry_core::error::StorageError;
use flurry_core::metrics::events::{FinalizeOperation, RemoteFinalized};

use crate::config::PollerConfig;
use crate::error::{FinalizeFailedSnafu, SyncError};
use crate::source::{RemoteObjectRef, RemoteStore};

/// What happens to a remote object once its local copy is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeAction {
    /// Leave the object in place.
    None,
    /// Delete the object.
    Delete,
    /// Move the object under `<prefix><separator>`, keeping its base name,
    /// or its whole key for recursive listings.
    Archive { prefix: String },
}

impl FinalizeAction {
    pub fn from_config(config: &PollerConfig) -> Self {
        if config.delete_remote_files {
            Self::Delete
        } else if let Some(prefix) = config.archive_prefix() {
            Self::Archive {
                prefix: prefix.to_string(),
            }
        } else {
            Self::None
        }
    }
}

/// Applies the configured [`FinalizeAction`] to staged objects.
///
/// Failures are logged and counted. They never undo the local file.
pub struct RemoteObjectFinalizer {
    store: Arc<dyn RemoteStore>,
    action: FinalizeAction,
    separator: String,
    recursive: bool,
    target: String,
}

impl RemoteObjectFinalizer {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        action: FinalizeAction,
        separator: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            store,
            action,
            separator: separator.into(),
            recursive: false,
            target: target.into(),
        }
    }

    /// Keep the full key below the archive prefix. Needed whenever keys
    /// can share a base name.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn action(&self) -> &FinalizeAction {
        &self.action
    }

    /// Destination of an archived object.
    pub fn archive_location(
        &self,
        prefix: &str,
        object: &RemoteObjectRef,
    ) -> Result<Path, StorageError> {
        let name = if self.recursive {
            object.key()
        } else {
            object.basename(&self.separator)
        };
        let destination = format!("{prefix}{}{name}", self.separator);
        Path::parse(&destination).map_err(|e| StorageError::ObjectStore { source: e.into() })
    }

    pub async fn finalize(&self, object: &RemoteObjectRef) -> Result<(), SyncError> {
        let (operation, result) = match &self.action {
            FinalizeAction::None => return Ok(()),
            FinalizeAction::Delete => (
                FinalizeOperation::Delete,
                self.store.delete(&object.location).await,
            ),
            FinalizeAction::Archive { prefix } => {
                let result = match self.archive_location(prefix, object) {
                    Ok(to) => self.store.rename(&object.location, &to).await,
                    Err(e) => Err(e),
                };
                (FinalizeOperation::Archive, result)
            }
        };

        emit!(RemoteFinalized {
            operation,
            success: result.is_ok(),
            target: self.target.clone(),
        });

        match result {
            Ok(()) => {
                debug!(
                    target = %self.target,
                    key = object.key(),
                    operation = operation.as_str(),
                    "Finalized remote object"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    target = %self.target,
                    key = object.key(),
                    operation = operation.as_str(),
                    error = %e,
                    "Failed to finalize remote object; local file kept"
                );
                Err(e).context(FinalizeFailedSnafu { key: object.key() })
            }
        }
    }
}
