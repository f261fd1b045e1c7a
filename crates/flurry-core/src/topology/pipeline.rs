//! Running several pipelines with shared shutdown and jittered starts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use snafu::ResultExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::GlobalConfig;
use crate::error::{AddressParseSnafu, MetricsSnafu, PipelineSetupError};
use crate::signal::shutdown_signal;

/// Shared resources handed to every pipeline.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    /// Maximum jitter in seconds added to start times and poll waits.
    pub poll_jitter_secs: u64,
    /// Cancellation token for graceful shutdown.
    pub shutdown: CancellationToken,
}

impl PipelineContext {
    pub fn new(poll_jitter_secs: u64, shutdown: CancellationToken) -> Self {
        Self {
            poll_jitter_secs,
            shutdown,
        }
    }
}

/// A self-contained unit of work run by [`PipelineRunner`].
pub trait Pipeline: Send + 'static {
    type Key: Clone + Display + Send + 'static;
    type Error: std::error::Error + Send + 'static;

    fn key(&self) -> &Self::Key;

    /// Run to completion (normally until shutdown).
    fn run(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Spawns pipelines on a `JoinSet` and waits for all of them.
pub struct PipelineRunner<P: Pipeline> {
    pipelines: Vec<P>,
    shutdown: CancellationToken,
    poll_jitter_secs: u64,
    typetag: &'static str,
}

impl<P: Pipeline> PipelineRunner<P> {
    pub fn new(
        pipelines: Vec<P>,
        shutdown: CancellationToken,
        poll_jitter_secs: u64,
        typetag: &'static str,
    ) -> Self {
        Self {
            pipelines,
            shutdown,
            poll_jitter_secs,
            typetag,
        }
    }

    /// Cancel the shared token when SIGINT, SIGTERM or SIGQUIT arrives.
    pub fn spawn_shutdown_handler(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    /// Run all pipelines. Returns the number that ended with an error or panic.
    pub async fn run(self) -> usize {
        let mut handles: JoinSet<(P::Key, Result<(), P::Error>)> = JoinSet::new();
        let typetag = self.typetag;

        for pipeline in self.pipelines {
            let shutdown = self.shutdown.clone();
            let key = pipeline.key().clone();
            let start_jitter = random_jitter(self.poll_jitter_secs);

            handles.spawn(async move {
                if !start_jitter.is_zero() {
                    info!(
                        target = %key,
                        jitter_ms = start_jitter.as_millis(),
                        "Delaying {typetag} start for jitter"
                    );
                    if shutdown
                        .run_until_cancelled(tokio::time::sleep(start_jitter))
                        .await
                        .is_none()
                    {
                        info!(target = %key, "Shutdown requested during jitter delay");
                        return (key, Ok(()));
                    }
                }

                let result = pipeline.run().await;
                (key, result)
            });
        }

        info!("Spawned {} {typetag} tasks", handles.len());

        let mut failed = 0;
        while let Some(result) = handles.join_next().await {
            match result {
                Ok((key, Ok(()))) => info!(target = %key, "{typetag} completed"),
                Ok((key, Err(e))) => {
                    failed += 1;
                    error!(target = %key, error = %e, "{typetag} failed");
                }
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "{typetag} task panicked");
                }
            }
        }

        info!("All {typetag}s complete");
        failed
    }
}

/// Start the metrics endpoint, build pipelines and run them until shutdown.
///
/// Returns the number of pipelines that failed.
pub async fn run_pipelines<P, F>(
    metrics_address: &str,
    global: &GlobalConfig,
    typetag: &'static str,
    create_pipelines: F,
) -> Result<usize, PipelineSetupError>
where
    P: Pipeline,
    F: FnOnce(PipelineContext) -> Vec<P>,
{
    let addr = metrics_address.parse().context(AddressParseSnafu)?;
    crate::metrics::init_global(addr).context(MetricsSnafu)?;

    let shutdown = CancellationToken::new();
    let context = PipelineContext::new(global.poll_jitter_secs, shutdown.clone());
    let pipelines = create_pipelines(context);

    let runner = PipelineRunner::new(pipelines, shutdown, global.poll_jitter_secs, typetag);
    runner.spawn_shutdown_handler();
    Ok(runner.run().await)
}

/// Random duration in `[0, max_secs)` with millisecond resolution.
pub fn random_jitter(max_secs: u64) -> Duration {
    if max_secs > 0 {
        Duration::from_millis(rand::rng().random_range(0..max_secs * 1000))
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_random_jitter_zero() {
        assert_eq!(random_jitter(0), Duration::ZERO);
    }

    #[test]
    fn test_random_jitter_within_bounds() {
        for _ in 0..100 {
            assert!(random_jitter(2) < Duration::from_secs(2));
        }
    }

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    struct TestPipeline {
        key: String,
        fail: bool,
        runs: Arc<AtomicUsize>,
    }

    impl Pipeline for TestPipeline {
        type Key = String;
        type Error = Boom;

        fn key(&self) -> &String {
            &self.key
        }

        async fn run(self) -> Result<(), Boom> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail { Err(Boom) } else { Ok(()) }
        }
    }

    #[tokio::test]
    async fn test_runner_counts_failures() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pipelines = vec![
            TestPipeline {
                key: "ok".to_string(),
                fail: false,
                runs: runs.clone(),
            },
            TestPipeline {
                key: "bad".to_string(),
                fail: true,
                runs: runs.clone(),
            },
        ];

        let runner = PipelineRunner::new(pipelines, CancellationToken::new(), 0, "poller");
        assert_eq!(runner.run().await, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
