//! The synchronization engine: one poller's list → filter → stage →
//! finalize → emit cycle.
//!
//! A cycle only ever runs through `&mut self`, so two cycles of one engine
//! cannot overlap. Different pollers each own their engine and share nothing.

mod summary;

pub use summary::{CyclePhase, CycleSummary, ObjectFailure};

use snafu::ResultExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flurry_core::emit;
use flurry_core::error::ConfigError;
use flurry_core::metrics::events::{ObjectsEligible, SeenSetSize, TransferFailed};

use crate::config::{PollerConfig, PollerKey};
use crate::emitter::FileReadinessEmitter;
use crate::error::{BackendUnavailableSnafu, SeenStateError, SyncError};
use crate::filter::FileEligibilityFilter;
use crate::finalize::{FinalizeAction, RemoteObjectFinalizer};
use crate::seen::SeenSet;
use crate::sink::EventSink;
use crate::source::{RemoteObjectLister, RemoteObjectRef, RemoteStore};
use crate::staging::{LocalStagingWriter, StagedFile};

/// The parts an engine is assembled from.
pub struct EngineComponents {
    pub lister: RemoteObjectLister,
    pub filter: FileEligibilityFilter,
    pub writer: LocalStagingWriter,
    pub finalizer: RemoteObjectFinalizer,
    pub emitter: FileReadinessEmitter,
    pub seen: SeenSet,
}

/// Runs poll cycles for one poller.
pub struct SynchronizationEngine {
    lister: RemoteObjectLister,
    filter: FileEligibilityFilter,
    writer: LocalStagingWriter,
    finalizer: RemoteObjectFinalizer,
    emitter: FileReadinessEmitter,
    seen: SeenSet,
    separator: String,
    max_messages_per_poll: Option<usize>,
    phase: CyclePhase,
    temp_files_swept: bool,
    target: String,
}

impl SynchronizationEngine {
    pub fn new(
        components: EngineComponents,
        separator: impl Into<String>,
        max_messages_per_poll: Option<usize>,
        target: impl Into<String>,
    ) -> Self {
        let EngineComponents {
            lister,
            filter,
            writer,
            finalizer,
            emitter,
            seen,
        } = components;
        Self {
            lister,
            filter,
            writer,
            finalizer,
            emitter,
            seen,
            separator: separator.into(),
            max_messages_per_poll,
            phase: CyclePhase::Idle,
            temp_files_swept: false,
            target: target.into(),
        }
    }

    /// Assemble an engine from a poller's config.
    pub fn from_config(
        key: &PollerKey,
        config: &PollerConfig,
        store: Arc<dyn RemoteStore>,
        sink: Arc<dyn EventSink>,
        seen: SeenSet,
    ) -> Result<Self, ConfigError> {
        let target = key.to_string();
        let action = FinalizeAction::from_config(config);
        // Archived objects are never listed again.
        let exclude = match &action {
            FinalizeAction::Archive { prefix } => {
                Some(format!("{prefix}{}", config.remote_file_separator))
            }
            _ => None,
        };

        let components = EngineComponents {
            lister: RemoteObjectLister::new(store.clone(), config.recursive, &target)
                .excluding(exclude),
            filter: config.filter(key)?,
            writer: LocalStagingWriter::new(config, &target),
            finalizer: RemoteObjectFinalizer::new(
                store,
                action,
                &config.remote_file_separator,
                &target,
            )
            .recursive(config.recursive),
            emitter: FileReadinessEmitter::new(config, sink, &target),
            seen,
        };

        Ok(Self::new(
            components,
            &config.remote_file_separator,
            config.max_messages_per_poll,
            target,
        ))
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Recover persisted seen keys. Returns whether any state was found.
    pub async fn restore_seen(&mut self) -> Result<bool, SeenStateError> {
        self.seen.load().await
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(target = %self.target, from = %self.phase, to = %phase, "Cycle phase");
        self.phase = phase;
    }

    /// Run one full cycle.
    ///
    /// Only a listing failure is returned as an error; every per-object
    /// failure is recorded in the summary and retried on a later cycle.
    /// `cancel` is checked before each transfer and raced against the
    /// transfer in flight. Files staged before cancellation are still
    /// finalized and emitted.
    pub async fn poll_cycle(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CycleSummary, SyncError> {
        let mut summary = CycleSummary::default();

        self.enter(CyclePhase::Listing);
        let objects = match self.lister.list().await {
            Ok(objects) => objects,
            Err(e) => {
                self.enter(CyclePhase::Idle);
                return Err(e);
            }
        };
        summary.listed = objects.len();

        self.enter(CyclePhase::Filtering);
        let selected = self.select(objects, &mut summary);

        self.enter(CyclePhase::Staging);
        self.sweep_temp_files().await;
        let staged = self.stage_all(selected, cancel, &mut summary).await;

        self.enter(CyclePhase::Finalizing);
        for (object, _) in &staged {
            if let Err(e) = self.finalizer.finalize(object).await {
                summary.finalize_failed += 1;
                summary.record_failure(object.key(), CyclePhase::Finalizing, &e);
            }
        }

        self.enter(CyclePhase::Emitting);
        for (_, file) in &staged {
            match self.emitter.emit(file).await {
                Ok(count) => summary.emitted += count,
                Err(e) => summary.record_failure(&file.remote_key, CyclePhase::Emitting, &e),
            }
        }

        emit!(SeenSetSize {
            count: self.seen.len(),
            target: self.target.clone(),
        });
        if !staged.is_empty()
            && let Err(e) = self.seen.save().await
        {
            warn!(target = %self.target, error = %e, "Failed to save seen state");
        }

        self.enter(CyclePhase::Idle);
        self.log_summary(&summary);
        Ok(summary)
    }

    /// Keep eligible, unseen objects in key order, up to the per-poll limit.
    fn select(
        &self,
        objects: Vec<RemoteObjectRef>,
        summary: &mut CycleSummary,
    ) -> Vec<RemoteObjectRef> {
        let mut candidates: Vec<RemoteObjectRef> = objects
            .into_iter()
            .filter(|object| self.filter.matches(object, &self.separator))
            .filter(|object| !self.seen.contains(object.key()))
            .collect();
        candidates.sort_by(|a, b| a.key().cmp(b.key()));

        summary.eligible = candidates.len();
        emit!(ObjectsEligible {
            count: candidates.len() as u64,
            target: self.target.clone(),
        });

        if let Some(limit) = self.max_messages_per_poll
            && candidates.len() > limit
        {
            summary.skipped += candidates.len() - limit;
            candidates.truncate(limit);
        }
        candidates
    }

    /// Clear temp files from an earlier run, once per engine.
    async fn sweep_temp_files(&mut self) {
        if self.temp_files_swept {
            return;
        }
        match self.writer.sweep_temp_files().await {
            Ok(_) => self.temp_files_swept = true,
            Err(e) => {
                warn!(target = %self.target, error = %e, "Failed to sweep temp files, retrying next cycle");
            }
        }
    }

    async fn stage_all(
        &mut self,
        selected: Vec<RemoteObjectRef>,
        cancel: &CancellationToken,
        summary: &mut CycleSummary,
    ) -> Vec<(RemoteObjectRef, StagedFile)> {
        let total = selected.len();
        let mut staged = Vec::with_capacity(total);

        for (index, object) in selected.into_iter().enumerate() {
            if cancel.is_cancelled() {
                summary.skipped += total - index;
                info!(target = %self.target, remaining = total - index, "Shutdown requested, stopping transfers");
                break;
            }

            summary.attempted += 1;
            match self.transfer(&object, cancel).await {
                Ok(file) => {
                    self.seen.insert(object.key());
                    summary.staged += 1;
                    staged.push((object, file));
                }
                Err(e) => {
                    summary.failed += 1;
                    if let Some(reason) = e.reason() {
                        emit!(TransferFailed {
                            reason,
                            target: self.target.clone(),
                        });
                    }
                    warn!(
                        target = %self.target,
                        key = object.key(),
                        error = %e,
                        "Transfer failed, will retry next cycle"
                    );
                    summary.record_failure(object.key(), CyclePhase::Staging, &e);

                    if e.aborts_staging() {
                        summary.skipped += total - index - 1;
                        break;
                    }
                }
            }
        }
        staged
    }

    async fn transfer(
        &self,
        object: &RemoteObjectRef,
        cancel: &CancellationToken,
    ) -> Result<StagedFile, SyncError> {
        let download = self
            .lister
            .store()
            .get_stream(&object.location)
            .await
            .context(BackendUnavailableSnafu { key: object.key() })?;
        self.writer.stage(object, download.stream, cancel).await
    }

    fn log_summary(&self, summary: &CycleSummary) {
        if summary.attempted == 0 && summary.failures.is_empty() {
            debug!(
                target = %self.target,
                listed = summary.listed,
                eligible = summary.eligible,
                "Poll cycle found nothing new"
            );
            return;
        }
        info!(
            target = %self.target,
            listed = summary.listed,
            eligible = summary.eligible,
            attempted = summary.attempted,
            staged = summary.staged,
            failed = summary.failed,
            skipped = summary.skipped,
            emitted = summary.emitted,
            finalize_failed = summary.finalize_failed,
            "Poll cycle complete"
        );
    }
}
