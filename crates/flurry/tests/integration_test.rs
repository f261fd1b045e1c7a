//! Integration tests for flurry

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path as ObjectPath;
use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use flurry::config::{Config, PollerConfig, PollerKey};
use flurry::engine::{CyclePhase, SynchronizationEngine};
use flurry::error::SyncError;
use flurry::event::{EventPayload, OutboundEvent};
use flurry::sink::ChannelSink;
use flurry::source::{RemoteObjectRef, RemoteStore};
use flurry::{SeenSet, StorageProvider};
use flurry_core::ObjectDownload;
use flurry_core::error::StorageError;

/// Failures to inject into a [`FaultyStore`].
#[derive(Default)]
struct Faults {
    fail_list: bool,
    fail_delete: bool,
    fail_get: HashSet<String>,
    truncate_get: HashSet<String>,
}

/// A local-filesystem bucket that fails on demand.
struct FaultyStore {
    inner: StorageProvider,
    faults: Mutex<Faults>,
}

impl FaultyStore {
    fn new(inner: StorageProvider) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.faults.lock().unwrap());
    }
}

fn injected(operation: &str) -> StorageError {
    StorageError::ObjectStore {
        source: object_store::Error::Generic {
            store: "faulty",
            source: format!("injected {operation} failure").into(),
        },
    }
}

#[async_trait]
impl RemoteStore for FaultyStore {
    async fn list(&self, recursive: bool) -> Result<Vec<RemoteObjectRef>, StorageError> {
        if self.faults.lock().unwrap().fail_list {
            return Err(injected("list"));
        }
        RemoteStore::list(&self.inner, recursive).await
    }

    async fn get_stream(&self, location: &ObjectPath) -> Result<ObjectDownload, StorageError> {
        let key = location.to_string();
        let (fail, truncate) = {
            let mut faults = self.faults.lock().unwrap();
            (faults.fail_get.contains(&key), faults.truncate_get.remove(&key))
        };
        if fail {
            return Err(injected("get"));
        }

        let download = RemoteStore::get_stream(&self.inner, location).await?;
        if !truncate {
            return Ok(download);
        }

        let chunks: Vec<Bytes> = download.stream.try_collect().await.unwrap();
        let body = Bytes::from(chunks.concat());
        let short = body.slice(..body.len() / 2);
        Ok(ObjectDownload {
            meta: download.meta,
            stream: futures::stream::iter(vec![Ok(short)]).boxed(),
        })
    }

    async fn delete(&self, location: &ObjectPath) -> Result<(), StorageError> {
        if self.faults.lock().unwrap().fail_delete {
            return Err(injected("delete"));
        }
        RemoteStore::delete(&self.inner, location).await
    }

    async fn rename(&self, from: &ObjectPath, to: &ObjectPath) -> Result<(), StorageError> {
        RemoteStore::rename(&self.inner, from, to).await
    }

    fn describe(&self) -> &str {
        self.inner.describe()
    }
}

struct Harness {
    remote: TempDir,
    local: TempDir,
    store: Arc<FaultyStore>,
    engine: SynchronizationEngine,
    events: Receiver<OutboundEvent>,
}

impl Harness {
    async fn new(configure: impl FnOnce(&mut PollerConfig)) -> Self {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        Self::with_dirs(remote, local, configure, |key| SeenSet::in_memory(key)).await
    }

    async fn with_dirs(
        remote: TempDir,
        local: TempDir,
        configure: impl FnOnce(&mut PollerConfig),
        seen: impl FnOnce(&PollerKey) -> SeenSet,
    ) -> Self {
        let mut config = PollerConfig::new(
            remote.path().to_str().unwrap(),
            local.path().to_str().unwrap(),
        );
        configure(&mut config);

        let provider = local_provider(remote.path()).await;
        let store = Arc::new(FaultyStore::new(provider));
        let (sink, events) = ChannelSink::channel(256);
        let key = PollerKey::new("test");

        let engine = SynchronizationEngine::from_config(
            &key,
            &config,
            store.clone(),
            Arc::new(sink),
            seen(&key),
        )
        .unwrap();

        Self {
            remote,
            local,
            store,
            engine,
            events,
        }
    }

    fn put_remote(&self, key: &str, content: &[u8]) {
        let path = self.remote.path().join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn local_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.local.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn drain_keys(&mut self) -> Vec<String> {
        let mut keys = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            keys.push(event.metadata.origin_key);
        }
        keys
    }

    async fn cycle(&mut self) -> flurry::CycleSummary {
        self.engine
            .poll_cycle(&CancellationToken::new())
            .await
            .unwrap()
    }
}

async fn local_provider(path: &Path) -> StorageProvider {
    StorageProvider::for_url_with_options(path.to_str().unwrap(), HashMap::new())
        .await
        .unwrap()
}

mod config_tests {
    use super::*;
    use flurry_core::ConfigPath;

    #[test]
    fn test_load_from_config_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("10-invoices.yaml"),
            r#"
pollers:
  invoices:
    remote_dir: s3://bucket/incoming
    local_dir: /var/spool/invoices
    filename_pattern: "*.csv"
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("20-reports.yml"),
            r#"
pollers:
  reports:
    remote_dir: gs://reports/daily
    local_dir: /var/spool/reports
global:
  poll_jitter_secs: 3
sink:
  kind: log
"#,
        )
        .unwrap();

        let config = Config::from_paths(&[ConfigPath::dir(dir.path())]).unwrap();
        let keys: Vec<&str> = config.pollers().map(|(k, _)| k.id()).collect();
        assert_eq!(keys, vec!["invoices", "reports"]);
        assert_eq!(config.global.poll_jitter_secs, 3);
        assert_eq!(config.sink, flurry::config::SinkConfig::Log);
    }

    #[test]
    fn test_duplicate_poller_across_files() {
        let dir = TempDir::new().unwrap();
        let poller = "pollers:\n  same:\n    remote_dir: s3://b/x\n    local_dir: /tmp/x\n";
        std::fs::write(dir.path().join("a.yaml"), poller).unwrap();
        std::fs::write(dir.path().join("b.yaml"), poller).unwrap();

        let err = Config::from_paths(&[ConfigPath::dir(dir.path())]).unwrap_err();
        assert!(err.to_string().contains("Duplicate component keys: same"));
    }

    #[test]
    fn test_local_dir_conflict_across_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "pollers:\n  a:\n    remote_dir: s3://b/a\n    local_dir: /tmp/shared\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "pollers:\n  b:\n    remote_dir: s3://b/b\n    local_dir: /tmp/shared\n",
        )
        .unwrap();

        let err = Config::from_paths(&[ConfigPath::dir(dir.path())]).unwrap_err();
        assert!(err.to_string().contains("Resource conflict"));
    }
}

mod engine_tests {
    use super::*;

    #[tokio::test]
    async fn test_idempotent_cycles() {
        let mut h = Harness::new(|_| {}).await;
        h.put_remote("a.txt", b"alpha");
        h.put_remote("b.txt", b"beta");

        let first = h.cycle().await;
        assert_eq!(first.listed, 2);
        assert_eq!(first.staged, 2);
        assert_eq!(first.emitted, 2);
        assert_eq!(h.drain_keys(), vec!["a.txt", "b.txt"]);

        let second = h.cycle().await;
        assert_eq!(second.listed, 2);
        assert_eq!(second.eligible, 0);
        assert_eq!(second.staged, 0);
        assert_eq!(second.emitted, 0);
        assert!(h.drain_keys().is_empty());
        assert_eq!(h.engine.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_seen_key_never_restaged() {
        let mut h = Harness::new(|_| {}).await;
        h.put_remote("a.txt", b"original");
        h.cycle().await;

        h.put_remote("a.txt", b"rewritten with new content");
        let summary = h.cycle().await;

        assert_eq!(summary.attempted, 0);
        assert_eq!(
            std::fs::read(h.local.path().join("a.txt")).unwrap(),
            b"original"
        );
    }

    #[tokio::test]
    async fn test_staged_file_matches_recorded_size() {
        let mut h = Harness::new(|_| {}).await;
        let content = vec![42u8; 64 * 1024];
        h.put_remote("big.bin", &content);

        h.cycle().await;

        let event = h.events.try_recv().unwrap();
        let on_disk = std::fs::metadata(h.local.path().join("big.bin")).unwrap().len();
        assert_eq!(event.metadata.size, on_disk);
        assert_eq!(on_disk, content.len() as u64);
        assert_eq!(h.local_entries(), vec!["big.bin"]);
    }

    #[tokio::test]
    async fn test_pattern_takes_precedence_over_regex() {
        let mut h = Harness::new(|c| {
            c.filename_pattern = Some("*.csv".to_string());
            c.filename_regex = Some(r".*\.json$".to_string());
        })
        .await;
        h.put_remote("a.csv", b"1");
        h.put_remote("b.json", b"{}");

        let summary = h.cycle().await;
        assert_eq!(summary.eligible, 1);
        assert_eq!(h.local_entries(), vec!["a.csv"]);
    }

    #[tokio::test]
    async fn test_key_order_and_limit() {
        let mut h = Harness::new(|c| c.max_messages_per_poll = Some(2)).await;
        h.put_remote("b.txt", b"b");
        h.put_remote("a.txt", b"a");
        h.put_remote("c.txt", b"c");

        let first = h.cycle().await;
        assert_eq!(first.staged, 2);
        assert_eq!(first.skipped, 1);
        assert_eq!(h.drain_keys(), vec!["a.txt", "b.txt"]);

        let second = h.cycle().await;
        assert_eq!(second.staged, 1);
        assert_eq!(h.drain_keys(), vec!["c.txt"]);
    }

    #[tokio::test]
    async fn test_failed_delete_still_emits_and_records() {
        let mut h = Harness::new(|c| c.delete_remote_files = true).await;
        h.put_remote("a.txt", b"a");
        h.store.update(|f| f.fail_delete = true);

        let first = h.cycle().await;
        assert_eq!(first.staged, 1);
        assert_eq!(first.finalize_failed, 1);
        assert_eq!(first.emitted, 1);
        assert_eq!(first.failed_keys(CyclePhase::Finalizing), vec!["a.txt"]);
        assert!(h.remote.path().join("a.txt").exists());
        assert!(h.local.path().join("a.txt").exists());

        let second = h.cycle().await;
        assert_eq!(second.attempted, 0);
        assert_eq!(h.drain_keys(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_delete_remote_files() {
        let mut h = Harness::new(|c| c.delete_remote_files = true).await;
        h.put_remote("a.txt", b"a");

        let summary = h.cycle().await;
        assert_eq!(summary.finalize_failed, 0);
        assert!(!h.remote.path().join("a.txt").exists());
        assert!(h.local.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_truncated_transfer_retried() {
        let mut h = Harness::new(|_| {}).await;
        h.put_remote("a.txt", b"0123456789");
        h.store.update(|f| {
            f.truncate_get.insert("a.txt".to_string());
        });

        let first = h.cycle().await;
        assert_eq!(first.failed, 1);
        assert_eq!(first.staged, 0);
        assert_eq!(first.emitted, 0);
        assert!(h.local_entries().is_empty());

        let second = h.cycle().await;
        assert_eq!(second.staged, 1);
        assert_eq!(
            std::fs::read(h.local.path().join("a.txt")).unwrap(),
            b"0123456789"
        );
        assert_eq!(h.drain_keys(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_get_failure_skips_only_that_object() {
        let mut h = Harness::new(|_| {}).await;
        h.put_remote("a.txt", b"a");
        h.put_remote("b.txt", b"b");
        h.store.update(|f| {
            f.fail_get.insert("a.txt".to_string());
        });

        let summary = h.cycle().await;
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.staged, 1);
        assert_eq!(summary.failed_keys(CyclePhase::Staging), vec!["a.txt"]);
        assert_eq!(h.drain_keys(), vec!["b.txt"]);

        h.store.update(|f| f.fail_get.clear());
        let retry = h.cycle().await;
        assert_eq!(retry.staged, 1);
        assert_eq!(h.drain_keys(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_cycle() {
        let mut h = Harness::new(|_| {}).await;
        h.put_remote("a.txt", b"a");
        h.store.update(|f| f.fail_list = true);

        let err = h
            .engine
            .poll_cycle(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::BackendUnavailable { .. }));
        assert_eq!(h.engine.phase(), CyclePhase::Idle);
        assert!(h.local_entries().is_empty());

        h.store.update(|f| f.fail_list = false);
        assert_eq!(h.cycle().await.staged, 1);
    }

    #[tokio::test]
    async fn test_missing_local_dir_aborts_staging() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let missing = local.path().join("missing");
        let missing_str = missing.to_str().unwrap().to_string();

        let mut h = Harness::with_dirs(
            remote,
            local,
            |c| {
                c.local_dir = missing_str;
                c.auto_create_local_dir = false;
            },
            SeenSet::in_memory,
        )
        .await;
        h.put_remote("a.txt", b"a");
        h.put_remote("b.txt", b"b");
        h.put_remote("c.txt", b"c");

        let summary = h.cycle().await;
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 2);
        assert!(!missing.exists());

        std::fs::create_dir_all(&missing).unwrap();
        assert_eq!(h.cycle().await.staged, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_staging() {
        let mut h = Harness::new(|_| {}).await;
        h.put_remote("a.txt", b"a");
        h.put_remote("b.txt", b"b");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = h.engine.poll_cycle(&cancel).await.unwrap();

        assert_eq!(summary.eligible, 2);
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.skipped, 2);
        assert!(h.local_entries().is_empty());
        assert!(!h.engine.seen().contains("a.txt"));
    }

    #[tokio::test]
    async fn test_archive_with_recursive_listing() {
        let mut h = Harness::new(|c| {
            c.recursive = true;
            c.archive_dir = Some("done".to_string());
        })
        .await;
        h.put_remote("a.txt", b"a");
        h.put_remote("2024/b.txt", b"b");

        let first = h.cycle().await;
        assert_eq!(first.staged, 2);
        assert!(h.remote.path().join("done/a.txt").exists());
        assert!(h.remote.path().join("done/2024/b.txt").exists());
        assert!(h.local.path().join("2024/b.txt").exists());

        let second = h.cycle().await;
        assert_eq!(second.listed, 0);
        assert_eq!(second.attempted, 0);
    }

    #[tokio::test]
    async fn test_recursive_archive_keeps_same_named_objects() {
        let mut h = Harness::new(|c| {
            c.recursive = true;
            c.archive_dir = Some("done".to_string());
        })
        .await;
        h.put_remote("2024/b.txt", b"from 2024");
        h.put_remote("2025/b.txt", b"from 2025");

        let summary = h.cycle().await;
        assert_eq!(summary.staged, 2);
        assert_eq!(summary.finalize_failed, 0);
        assert_eq!(
            std::fs::read(h.remote.path().join("done/2024/b.txt")).unwrap(),
            b"from 2024"
        );
        assert_eq!(
            std::fs::read(h.remote.path().join("done/2025/b.txt")).unwrap(),
            b"from 2025"
        );
        assert_eq!(
            std::fs::read(h.local.path().join("2024/b.txt")).unwrap(),
            b"from 2024"
        );
        assert_eq!(
            std::fs::read(h.local.path().join("2025/b.txt")).unwrap(),
            b"from 2025"
        );
    }

    #[tokio::test]
    async fn test_archive_with_custom_separator_not_reingested() {
        let mut h = Harness::new(|c| {
            c.remote_file_separator = "_".to_string();
            c.archive_dir = Some("done".to_string());
        })
        .await;
        h.put_remote("batch_a.csv", b"1,2");

        let first = h.cycle().await;
        assert_eq!(first.staged, 1);
        assert_eq!(h.drain_keys(), vec!["batch_a.csv"]);
        assert!(h.remote.path().join("done_a.csv").exists());
        assert!(!h.remote.path().join("batch_a.csv").exists());

        let second = h.cycle().await;
        assert_eq!(second.listed, 0);
        assert_eq!(second.staged, 0);
        assert!(h.drain_keys().is_empty());
        assert_eq!(h.local_entries(), vec!["a.csv"]);
    }

    #[tokio::test]
    async fn test_leftover_temp_files_swept_on_first_cycle() {
        let mut h = Harness::new(|_| {}).await;
        std::fs::write(h.local.path().join("stale.csv.tmp"), b"").unwrap();
        h.put_remote("a.txt", b"a");

        h.cycle().await;
        assert_eq!(h.local_entries(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_seen_state_survives_restart() {
        let state = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let storage = Arc::new(local_provider(state.path()).await);

        let mut first = Harness::with_dirs(remote, local, |_| {}, |key| {
            SeenSet::persistent(storage.clone(), key)
        })
        .await;
        first.put_remote("a.txt", b"a");
        assert_eq!(first.cycle().await.staged, 1);
        assert!(state.path().join("test_seen.json").exists());

        // Same directories, fresh engine.
        let Harness { remote, local, .. } = first;
        let mut second = Harness::with_dirs(remote, local, |_| {}, |key| {
            SeenSet::persistent(storage.clone(), key)
        })
        .await;

        assert!(second.engine.restore_seen().await.unwrap());
        let summary = second.cycle().await;
        assert_eq!(summary.listed, 1);
        assert_eq!(summary.attempted, 0);
    }

    #[tokio::test]
    async fn test_binary_events_carry_content() {
        let mut h = Harness::new(|c| c.read_mode = flurry::ReadMode::Binary).await;
        h.put_remote("a.bin", &[1, 2, 3]);

        h.cycle().await;
        let event = h.events.try_recv().unwrap();
        assert_eq!(event.payload, EventPayload::Bytes(vec![1, 2, 3]));
        assert_eq!(event.metadata.origin_key, "a.bin");
    }
}

mod pipeline_tests {
    use super::*;
    use flurry::PollerPipeline;
    use flurry_core::{Pipeline, PipelineContext};
    use std::time::Duration;

    #[tokio::test]
    async fn test_pipeline_emits_and_stops_on_shutdown() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        std::fs::write(remote.path().join("a.txt"), b"hello").unwrap();

        let config = PollerConfig::new(
            remote.path().to_str().unwrap(),
            local.path().to_str().unwrap(),
        );
        let (sink, mut events) = ChannelSink::channel(16);
        let shutdown = CancellationToken::new();
        let pipeline = PollerPipeline::new(
            PollerKey::new("it"),
            config,
            Arc::new(sink),
            PipelineContext::new(0, shutdown.clone()),
        );

        let handle = tokio::spawn(pipeline.run());

        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        assert_eq!(event.metadata.origin_key, "a.txt");
        assert_eq!(
            event.payload,
            EventPayload::Path(local.path().join("a.txt"))
        );

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("pipeline stops after shutdown")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_pipeline_fails_on_invalid_remote_url() {
        let local = TempDir::new().unwrap();
        let config = PollerConfig::new("ftp://nowhere/in", local.path().to_str().unwrap());
        let (sink, _events) = ChannelSink::channel(1);
        let pipeline = PollerPipeline::new(
            PollerKey::new("bad"),
            config,
            Arc::new(sink),
            PipelineContext::new(0, CancellationToken::new()),
        );

        assert!(pipeline.run().await.is_err());
    }
}
