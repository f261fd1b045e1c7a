//! Running pollers.
//!
//! Each configured poller becomes a [`PollerPipeline`] that builds its
//! storage clients and engine, then runs poll cycles on its trigger until
//! shutdown. Pollers share nothing but the shutdown token.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use flurry_core::emit;
use flurry_core::metrics::events::{TransferFailed, TransferFailureReason};
use flurry_core::polling::{IterationResult, PollingProcessor, run_polling_loop};
use flurry_core::{AppConfig, ConfigPath, ConfigError, Pipeline, PipelineContext, StorageProvider};

use crate::config::{Config, PollerConfig, PollerKey};
use crate::engine::{CycleSummary, SynchronizationEngine};
use crate::error::PollerError;
use crate::seen::SeenSet;
use crate::sink::{self, EventSink};
use crate::source::RemoteStore;

/// One poller, ready to run.
pub struct PollerPipeline {
    key: PollerKey,
    config: PollerConfig,
    sink: Arc<dyn EventSink>,
    context: PipelineContext,
}

impl PollerPipeline {
    pub fn new(
        key: PollerKey,
        config: PollerConfig,
        sink: Arc<dyn EventSink>,
        context: PipelineContext,
    ) -> Self {
        Self {
            key,
            config,
            sink,
            context,
        }
    }

    /// One pipeline per configured poller, all publishing to the
    /// configured sink.
    pub fn from_config(config: &Config, context: PipelineContext) -> Vec<Self> {
        let sink = sink::from_config(config.sink);
        config
            .pollers()
            .map(|(key, poller)| {
                Self::new(key.clone(), poller.clone(), sink.clone(), context.clone())
            })
            .collect()
    }
}

impl Pipeline for PollerPipeline {
    type Key = PollerKey;
    type Error = PollerError;

    fn key(&self) -> &PollerKey {
        &self.key
    }

    async fn run(self) -> Result<(), PollerError> {
        let trigger = self.config.trigger.to_trigger(&self.key)?;
        let shutdown = self.context.shutdown.clone();

        let mut processor = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(target = %self.key, "Shutdown requested during initialization");
                return Ok(());
            }

            result = PollerProcessor::new(
                &self.key,
                &self.config,
                self.sink.clone(),
                shutdown.clone(),
            ) => result?,
        };

        info!(
            target = %self.key,
            remote_dir = %self.config.remote_dir,
            local_dir = %self.config.local_dir,
            trigger = %trigger,
            "Poller initialized"
        );

        run_polling_loop(
            &mut processor,
            &trigger,
            self.context.poll_jitter_secs,
            shutdown,
            self.key.id(),
        )
        .await
    }
}

/// Drives a [`SynchronizationEngine`] from the polling loop.
pub struct PollerProcessor {
    engine: SynchronizationEngine,
    shutdown: CancellationToken,
    target: String,
}

impl PollerProcessor {
    /// Connect to the remote directory (and seen state, if configured) and
    /// assemble the engine.
    pub async fn new(
        key: &PollerKey,
        config: &PollerConfig,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> Result<Self, PollerError> {
        let remote = StorageProvider::for_url_with_options(
            &config.remote_dir,
            config.storage_options.clone(),
        )
        .await?;
        let store: Arc<dyn RemoteStore> = Arc::new(remote);

        let seen = match &config.seen_state {
            Some(state) => {
                let storage =
                    StorageProvider::for_url_with_options(&state.uri, state.storage_options.clone())
                        .await?;
                SeenSet::persistent(Arc::new(storage), key)
            }
            None => SeenSet::in_memory(key),
        };

        let engine = SynchronizationEngine::from_config(key, config, store, sink, seen)?;
        Ok(Self::from_engine(engine, shutdown, key))
    }

    pub fn from_engine(
        engine: SynchronizationEngine,
        shutdown: CancellationToken,
        key: &PollerKey,
    ) -> Self {
        Self {
            engine,
            shutdown,
            target: key.to_string(),
        }
    }

    pub fn engine(&self) -> &SynchronizationEngine {
        &self.engine
    }
}

fn iteration_result(summary: &CycleSummary) -> IterationResult {
    if summary.staged > 0 {
        IterationResult::ProcessedItems
    } else if summary.failed > 0 {
        IterationResult::Failed
    } else {
        IterationResult::NoItems
    }
}

#[async_trait]
impl PollingProcessor for PollerProcessor {
    type State = ();
    type Error = PollerError;

    async fn prepare(&mut self, cold_start: bool) -> Result<Option<()>, PollerError> {
        if cold_start && self.engine.seen().is_persistent() {
            self.engine.restore_seen().await?;
        }
        Ok(Some(()))
    }

    async fn process(&mut self, _state: ()) -> Result<IterationResult, PollerError> {
        match self.engine.poll_cycle(&self.shutdown).await {
            Ok(summary) => Ok(iteration_result(&summary)),
            Err(e) => {
                emit!(TransferFailed {
                    reason: e.reason().unwrap_or(TransferFailureReason::Backend),
                    target: self.target.clone(),
                });
                warn!(target = %self.target, error = %e, "Poll cycle aborted, retrying next trigger");
                Ok(IterationResult::Failed)
            }
        }
    }
}

impl AppConfig for Config {
    type Pipeline = PollerPipeline;

    const COMPONENT_NAME: &'static str = "poller";

    fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        Config::from_paths(paths)
    }

    fn create_pipelines(&self, context: PipelineContext) -> Vec<PollerPipeline> {
        PollerPipeline::from_config(self, context)
    }

    fn log_startup_info(&self) {
        info!(
            "Starting flurry with {} poller(s), sink: {:?}",
            self.poller_count(),
            self.sink
        );
        for (key, poller) in self.pollers() {
            let options: HashMap<&str, &str> = poller
                .storage_options
                .keys()
                .map(|k| (k.as_str(), "***"))
                .collect();
            info!(
                "  Poller: {} ({} -> {}) options: {:?}",
                key, poller.remote_dir, poller.local_dir, options
            );
        }
    }
}
