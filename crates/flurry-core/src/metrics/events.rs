//! Internal events for flurry metrics emission.
//!
//! Each struct is one measurable occurrence. Per-poller events carry a
//! `target` label holding the poller key.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    fn emit(self);
}

// ============================================================================
// Synchronization events
// ============================================================================

/// Objects returned by a remote listing.
pub struct ObjectsListed {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for ObjectsListed {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Objects listed");
        counter!("flurry_objects_listed_total", "target" => self.target).increment(self.count);
    }
}

/// Objects that passed the filename filter and were not yet seen.
pub struct ObjectsEligible {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for ObjectsEligible {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Objects eligible");
        counter!("flurry_objects_eligible_total", "target" => self.target).increment(self.count);
    }
}

/// A file was atomically staged into the local directory.
pub struct FileStaged {
    pub bytes: u64,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for FileStaged {
    fn emit(self) {
        trace!(
            bytes = self.bytes,
            duration_ms = self.duration.as_millis(),
            target = %self.target,
            "File staged"
        );
        counter!("flurry_files_staged_total", "target" => self.target.clone()).increment(1);
        counter!("flurry_bytes_downloaded_total", "target" => self.target.clone())
            .increment(self.bytes);
        histogram!("flurry_transfer_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// Why a transfer did not produce a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFailureReason {
    Backend,
    LocalDir,
    Incomplete,
    LocalWrite,
    Cancelled,
}

impl TransferFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferFailureReason::Backend => "backend_unavailable",
            TransferFailureReason::LocalDir => "local_dir_unavailable",
            TransferFailureReason::Incomplete => "transfer_incomplete",
            TransferFailureReason::LocalWrite => "local_write",
            TransferFailureReason::Cancelled => "cancelled",
        }
    }
}

/// A transfer failed and the object will be retried on a later cycle.
pub struct TransferFailed {
    pub reason: TransferFailureReason,
    pub target: String,
}

impl InternalEvent for TransferFailed {
    fn emit(self) {
        trace!(reason = self.reason.as_str(), target = %self.target, "Transfer failed");
        counter!(
            "flurry_transfer_failures_total",
            "reason" => self.reason.as_str(),
            "target" => self.target
        )
        .increment(1);
    }
}

/// What a finalizer did to a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOperation {
    Delete,
    Archive,
}

impl FinalizeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizeOperation::Delete => "delete",
            FinalizeOperation::Archive => "archive",
        }
    }
}

/// A remote object was finalized (or finalization failed).
pub struct RemoteFinalized {
    pub operation: FinalizeOperation,
    pub success: bool,
    pub target: String,
}

impl InternalEvent for RemoteFinalized {
    fn emit(self) {
        let status = if self.success { "success" } else { "error" };
        trace!(
            operation = self.operation.as_str(),
            status,
            target = %self.target,
            "Remote finalized"
        );
        counter!(
            "flurry_remote_finalize_total",
            "operation" => self.operation.as_str(),
            "status" => status,
            "target" => self.target
        )
        .increment(1);
    }
}

/// Events handed to the outbound sink.
pub struct EventsEmitted {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for EventsEmitted {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Events emitted");
        counter!("flurry_events_emitted_total", "target" => self.target).increment(self.count);
    }
}

/// The sink refused an event.
pub struct EmitFailed {
    pub target: String,
}

impl InternalEvent for EmitFailed {
    fn emit(self) {
        trace!(target = %self.target, "Emit failed");
        counter!("flurry_emit_failures_total", "target" => self.target).increment(1);
    }
}

/// Current number of keys in a poller's seen set.
pub struct SeenSetSize {
    pub count: usize,
    pub target: String,
}

impl InternalEvent for SeenSetSize {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Seen set size");
        gauge!("flurry_seen_keys", "target" => self.target).set(self.count as f64);
    }
}

/// The seen set was persisted.
pub struct SeenStateSaved {
    pub target: String,
}

impl InternalEvent for SeenStateSaved {
    fn emit(self) {
        trace!(target = %self.target, "Seen state saved");
        counter!("flurry_seen_state_saves_total", "target" => self.target).increment(1);
    }
}

// ============================================================================
// Polling loop events
// ============================================================================

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// At least one file was staged.
    Staged,
    /// Nothing new was found.
    Idle,
    /// The cycle could not list or stage anything because of an error.
    Failed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Staged => "staged",
            CycleOutcome::Idle => "idle",
            CycleOutcome::Failed => "failed",
        }
    }
}

/// A poll cycle finished.
pub struct CycleCompleted {
    pub outcome: CycleOutcome,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for CycleCompleted {
    fn emit(self) {
        trace!(
            outcome = self.outcome.as_str(),
            duration_ms = self.duration.as_millis(),
            target = %self.target,
            "Cycle completed"
        );
        counter!(
            "flurry_cycles_total",
            "outcome" => self.outcome.as_str(),
            "target" => self.target.clone()
        )
        .increment(1);
        histogram!("flurry_cycle_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Get,
    Put,
    Delete,
    List,
    Rename,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::Delete => "delete",
            StorageOperation::List => "list",
            StorageOperation::Rename => "rename",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_ok(ok: bool) -> Self {
        if ok {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// A storage request completed.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request"
        );
        counter!(
            "flurry_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!(
            "flurry_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
