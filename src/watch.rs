//! Watch mode: a debounced build scheduler over an abstract change feed.
//!
//! Filesystem drivers live in the host; they push [`BuildReason`]s into the
//! scheduler. Reasons coalesce over a debounce window, at most one build
//! runs at a time, and a configuration change triggers an explicit
//! environment reload (dispose, rebuild services, re-subscribe telemetry).

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    environment::BuildEnvironment,
    errors::Result,
    events::{SpanStatus, TelemetrySession},
    pipeline::{
        CancellationToken, SPAN_RUN, SPAN_WATCH_ITERATION,
        orchestrator::{BuildOptions, BuildRunResult, PipelineOrchestrator},
    },
};

/// Why a build was enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildReason {
    /// First build after the watcher starts.
    Initial,
    /// Token source files changed.
    SourceChanged { paths: Vec<PathBuf> },
    /// The configuration file changed; the environment must reload.
    ConfigChanged,
    /// Explicit rebuild request, e.g. a keypress in the host.
    Manual(String),
}

/// Sender half handed to filesystem drivers.
#[derive(Clone)]
pub struct WatchHandle {
    tx: mpsc::UnboundedSender<BuildReason>,
}

impl WatchHandle {
    pub fn enqueue(&self, reason: BuildReason) {
        // A dropped scheduler means the watch loop ended; nothing to do.
        let _ = self.tx.send(reason);
    }
}

/// Debounced reason queue: the first reason opens a window, everything
/// arriving within it coalesces into one batch.
pub struct DebouncedScheduler {
    rx: mpsc::UnboundedReceiver<BuildReason>,
    debounce: Duration,
}

impl DebouncedScheduler {
    pub fn channel(debounce: Duration) -> (WatchHandle, DebouncedScheduler) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WatchHandle { tx }, DebouncedScheduler { rx, debounce })
    }

    /// Await the next coalesced batch. Returns `None` when all handles are
    /// dropped.
    pub async fn next_batch(&mut self) -> Option<Vec<BuildReason>> {
        let first = self.rx.recv().await?;
        let mut batch = vec![first];
        loop {
            match tokio::time::timeout(self.debounce, self.rx.recv()).await {
                Ok(Some(reason)) => batch.push(reason),
                Ok(None) | Err(_) => break,
            }
        }
        batch.dedup();
        Some(batch)
    }
}

/// Factory rebuilding the environment after a configuration change.
pub type EnvironmentFactory = Box<dyn Fn() -> Result<Arc<BuildEnvironment>> + Send>;

/// Runs one build per batch, wrapping each run in a watch-iteration span.
pub struct WatchRunner {
    environment: Arc<BuildEnvironment>,
    rebuild: EnvironmentFactory,
    options: BuildOptions,
}

impl WatchRunner {
    pub fn new(
        environment: Arc<BuildEnvironment>,
        rebuild: EnvironmentFactory,
        options: BuildOptions,
    ) -> Self {
        Self {
            environment,
            rebuild,
            options,
        }
    }

    pub fn environment(&self) -> &Arc<BuildEnvironment> {
        &self.environment
    }

    /// Process one batch: reload the environment when the configuration
    /// changed, then run the pipeline under `dtifx.watch.iteration`.
    pub async fn run_iteration(
        &mut self,
        batch: &[BuildReason],
        cancellation: CancellationToken,
    ) -> Result<BuildRunResult> {
        if batch.iter().any(|reason| *reason == BuildReason::ConfigChanged) {
            debug!("configuration changed; reloading environment");
            self.environment.dispose()?;
            self.environment = (self.rebuild)()?;
        }

        let session =
            TelemetrySession::new(SPAN_WATCH_ITERATION, self.environment.exporter.clone());
        session
            .root()
            .set_attribute("dtifx.watch.reasons", serde_json::json!(batch.len()));
        let run_span = session.root().start_child(SPAN_RUN);

        let orchestrator = PipelineOrchestrator::new(self.environment.clone());
        let outcome = orchestrator
            .run_in_span(&run_span, self.options.clone(), cancellation)
            .await;

        session.root().end(match outcome {
            Ok(_) => SpanStatus::Ok,
            Err(_) => SpanStatus::Error,
        });
        session.export().await;
        outcome
    }

    /// Drain the scheduler until every handle is dropped or cancellation
    /// fires. Build failures are logged and do not stop the loop.
    pub async fn drive(
        &mut self,
        scheduler: &mut DebouncedScheduler,
        cancellation: CancellationToken,
    ) {
        while let Some(batch) = scheduler.next_batch().await {
            if cancellation.is_cancelled() {
                break;
            }
            if let Err(err) = self.run_iteration(&batch, cancellation.clone()).await {
                warn!("watch iteration failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;

    use super::{BuildReason, DebouncedScheduler, WatchRunner};
    use crate::{
        config::LoadedConfig,
        environment::BuildEnvironment,
        pipeline::{CancellationToken, orchestrator::BuildOptions},
    };

    /// Reasons arriving inside the window coalesce into one batch.
    #[tokio::test]
    async fn coalesces_reasons() {
        let (handle, mut scheduler) = DebouncedScheduler::channel(Duration::from_millis(50));
        handle.enqueue(BuildReason::Initial);
        handle.enqueue(BuildReason::SourceChanged { paths: vec![] });
        handle.enqueue(BuildReason::SourceChanged { paths: vec![] });
        let batch = scheduler.next_batch().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], BuildReason::Initial);
    }

    /// Dropping every handle ends the stream.
    #[tokio::test]
    async fn closes_when_handles_drop() {
        let (handle, mut scheduler) = DebouncedScheduler::channel(Duration::from_millis(5));
        drop(handle);
        assert!(scheduler.next_batch().await.is_none());
    }

    fn watch_config(dir: &std::path::Path) -> LoadedConfig {
        LoadedConfig::from_value(
            json!({
                "layers": [{"name": "base"}],
                "sources": [{
                    "kind": "virtual",
                    "id": "core",
                    "layer": "base",
                    "document": {"color": {"a": {"$type": "color", "$value": "#fff"}}}
                }]
            }),
            dir,
        )
        .unwrap()
    }

    /// A config-change reason disposes the old environment and builds with
    /// the fresh one.
    #[tokio::test]
    async fn config_change_reloads_environment() {
        crate::testutil::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let config = watch_config(dir.path());
        let env = Arc::new(BuildEnvironment::ephemeral(config.clone(), dir.path()));
        let scratch = dir.path().to_path_buf();
        let rebuild_config = config.clone();
        let mut runner = WatchRunner::new(
            env.clone(),
            Box::new(move || {
                Ok(Arc::new(BuildEnvironment::ephemeral(
                    rebuild_config.clone(),
                    scratch.clone(),
                )))
            }),
            BuildOptions {
                include_formatters: false,
                ..Default::default()
            },
        );

        let result = runner
            .run_iteration(&[BuildReason::ConfigChanged], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.metrics.token_count, 1);
        // The original environment was disposed.
        assert!(env.ensure_live().is_err());
        assert!(runner.environment().ensure_live().is_ok());
    }

    /// A plain iteration runs the pipeline and keeps the environment.
    #[tokio::test]
    async fn plain_iteration_builds() {
        let dir = tempfile::tempdir().unwrap();
        let config = watch_config(dir.path());
        let env = Arc::new(BuildEnvironment::ephemeral(config, dir.path()));
        let mut runner = WatchRunner::new(
            env.clone(),
            Box::new(|| unreachable!("no reload expected")),
            BuildOptions {
                include_formatters: false,
                ..Default::default()
            },
        );
        let result = runner
            .run_iteration(&[BuildReason::Initial], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.metrics.token_count, 1);
        assert!(env.ensure_live().is_ok());
    }
}
