//! Generic polling loop trait and runner.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::emit;
use crate::metrics::events::{CycleCompleted, CycleOutcome};
use crate::topology::random_jitter;
use crate::trigger::Trigger;

/// Result of a single processing iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationResult {
    /// Items were processed.
    ProcessedItems,
    /// No items were available to process.
    NoItems,
    /// The iteration could not complete; retry after the normal wait.
    Failed,
    /// Shutdown was requested.
    Shutdown,
}

/// A processor driven by [`run_polling_loop`].
#[async_trait]
pub trait PollingProcessor {
    /// The state type prepared for each iteration.
    type State: Send;
    /// The error type for this processor. Returning an error stops the loop.
    type Error: std::error::Error + Send;

    /// Prepare state for an iteration.
    ///
    /// `cold_start` is true on the first iteration, which is where persisted
    /// state should be recovered. Returns `None` when there is nothing to do.
    async fn prepare(&mut self, cold_start: bool) -> Result<Option<Self::State>, Self::Error>;

    /// Process the prepared state.
    ///
    /// Processors receive the shutdown token at construction and are
    /// expected to stop at their next safe point once it is cancelled.
    async fn process(&mut self, state: Self::State) -> Result<IterationResult, Self::Error>;
}

/// Run `processor` on `trigger`'s schedule until `shutdown` is cancelled.
///
/// 1. Wait the trigger's initial delay
/// 2. `prepare()` (raced against shutdown) then `process()`
/// 3. Wait the trigger's next delay plus up to `poll_jitter_secs` of jitter
/// 4. Repeat
///
/// `process()` is not raced against shutdown; a cycle in progress runs to its
/// own stopping point.
pub async fn run_polling_loop<P: PollingProcessor>(
    processor: &mut P,
    trigger: &Trigger,
    poll_jitter_secs: u64,
    shutdown: CancellationToken,
    name: &str,
) -> Result<(), P::Error> {
    let initial = trigger.initial_delay(Utc::now());
    if !initial.is_zero() {
        debug!(target = name, delay_ms = initial.as_millis(), "Waiting initial delay");
        if shutdown
            .run_until_cancelled(tokio::time::sleep(initial))
            .await
            .is_none()
        {
            info!(target = name, "Shutdown requested during initial delay");
            return Ok(());
        }
    }

    let mut cold_start = true;

    loop {
        let iteration_start = Instant::now();

        let state = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(target = name, "Shutdown requested during preparation");
                return Ok(());
            }

            result = processor.prepare(cold_start) => result?,
        };
        cold_start = false;

        let result = match state {
            Some(s) => processor.process(s).await?,
            None => IterationResult::NoItems,
        };

        let outcome = match result {
            IterationResult::Shutdown => break,
            IterationResult::ProcessedItems => CycleOutcome::Staged,
            IterationResult::NoItems => CycleOutcome::Idle,
            IterationResult::Failed => CycleOutcome::Failed,
        };
        emit!(CycleCompleted {
            outcome,
            duration: iteration_start.elapsed(),
            target: name.to_string(),
        });

        if shutdown.is_cancelled() {
            info!(target = name, "Shutdown requested during processing");
            break;
        }

        let wait = trigger.next_delay(Utc::now()) + random_jitter(poll_jitter_secs);
        debug!(
            target = name,
            outcome = outcome.as_str(),
            wait_ms = wait.as_millis(),
            "Iteration complete, waiting for next poll"
        );
        if shutdown
            .run_until_cancelled(tokio::time::sleep(wait))
            .await
            .is_none()
        {
            info!(target = name, "Shutdown requested during poll wait");
            break;
        }
    }

    Ok(())
}
