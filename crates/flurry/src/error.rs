//! Error types for the flurry bucket poller.

use snafu::prelude::*;
use std::path::PathBuf;

pub use flurry_core::error::{ConfigError, StorageError};
use flurry_core::metrics::events::TransferFailureReason;

/// Errors raised while synchronizing remote objects to the local staging area.
///
/// None of these stop the process: listing failures abort the current cycle,
/// per-object failures skip the object, and everything is retried on the
/// next trigger.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SyncError {
    /// Transport or authentication failure talking to the backend.
    #[snafu(display("Backend unavailable for '{key}': {source}"))]
    BackendUnavailable { key: String, source: StorageError },

    /// The local staging directory is missing or cannot be created.
    #[snafu(display("Local directory {} unavailable: {source}", path.display()))]
    LocalDirUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The number of bytes received differs from the listed size.
    #[snafu(display("Transfer of '{key}' incomplete: expected {expected} bytes, got {actual}"))]
    TransferIncomplete {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Writing, syncing or renaming a local file failed.
    #[snafu(display("Local write to {} failed: {source}", path.display()))]
    LocalWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Deleting or archiving the remote original failed.
    #[snafu(display("Finalizing '{key}' failed: {source}"))]
    FinalizeFailed { key: String, source: StorageError },

    /// The transfer was abandoned because shutdown was requested.
    #[snafu(display("Transfer of '{key}' cancelled"))]
    Cancelled { key: String },
}

impl SyncError {
    /// Metric label for a failed transfer. `None` for finalize failures,
    /// which do not undo a transfer.
    pub fn reason(&self) -> Option<TransferFailureReason> {
        match self {
            SyncError::BackendUnavailable { .. } => Some(TransferFailureReason::Backend),
            SyncError::LocalDirUnavailable { .. } => Some(TransferFailureReason::LocalDir),
            SyncError::TransferIncomplete { .. } => Some(TransferFailureReason::Incomplete),
            SyncError::LocalWrite { .. } => Some(TransferFailureReason::LocalWrite),
            SyncError::Cancelled { .. } => Some(TransferFailureReason::Cancelled),
            SyncError::FinalizeFailed { .. } => None,
        }
    }

    /// Whether the rest of the staging phase should be skipped.
    pub fn aborts_staging(&self) -> bool {
        matches!(
            self,
            SyncError::LocalDirUnavailable { .. } | SyncError::Cancelled { .. }
        )
    }
}

/// Errors raised while turning a staged file into events.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EmitError {
    /// Failed to read the staged file.
    #[snafu(display("Failed to read staged file {}: {source}", path.display()))]
    ReadStaged {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The receiving end of the event channel was dropped.
    #[snafu(display("Event channel closed"))]
    ChannelClosed,

    /// Failed to encode an event.
    #[snafu(display("Failed to encode event: {source}"))]
    Encode { source: serde_json::Error },

    /// Failed to write an encoded event.
    #[snafu(display("Failed to write event: {source}"))]
    Write { source: std::io::Error },
}

/// Errors raised while loading or saving the seen set.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SeenStateError {
    /// Failed to read or write the state object.
    #[snafu(display("Seen state storage error: {source}"))]
    SeenStorage { source: StorageError },

    /// The state object exists but is not valid JSON.
    #[snafu(display("Failed to decode seen state: {source}"))]
    Decode { source: serde_json::Error },

    /// Failed to encode the state.
    #[snafu(display("Failed to encode seen state: {source}"))]
    EncodeState { source: serde_json::Error },
}

/// Errors that stop a poller pipeline.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PollerError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error while setting up the poller.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Seen state could not be recovered.
    #[snafu(display("Seen state error: {source}"))]
    SeenState { source: SeenStateError },
}

impl From<ConfigError> for PollerError {
    fn from(source: ConfigError) -> Self {
        PollerError::Config { source }
    }
}

impl From<StorageError> for PollerError {
    fn from(source: StorageError) -> Self {
        PollerError::Storage { source }
    }
}

impl From<SeenStateError> for PollerError {
    fn from(source: SeenStateError) -> Self {
        PollerError::SeenState { source }
    }
}
