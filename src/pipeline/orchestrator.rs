//! Pipeline orchestrator: composes the stages under one telemetry tree and
//! owns stage ordering, timings, cancellation and the run result.
//!
//! Stage order is fixed: plan → resolve → flatten → metrics → dependency
//! evaluate → (transform) → (format) → dependency commit. Any stage failure
//! ends its span (and the root) with error status, skips everything
//! downstream including the commit, and still exports telemetry.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    diagnostics::LogEvent,
    environment::BuildEnvironment,
    errors::{DtifxError, Result},
    events::{
        EngineEvent, Span, SpanData, SpanStatus, TelemetrySession,
    },
    formatters::FormatterPlan,
    model::TokenSnapshot,
    pipeline::{
        CancellationToken, SPAN_FORMAT, SPAN_PLAN, SPAN_RESOLVE, SPAN_RUN, SPAN_TRANSFORM,
        formatter::{FormatterExecutor, FormatterStageResult},
        resolver::{ResolutionSession, ResolvedPlan},
        tracker::{DependencyEvaluation, DependencyTracker},
        transform::{TransformExecutor, TransformStageResult},
    },
    transforms::PreparedTransform,
};

/// Per-run options, the engine-facing shape of the CLI build flags.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub include_transforms: bool,
    pub include_formatters: bool,
    /// Retain the alias graph on the resolved plan.
    pub include_graphs: bool,
    /// Write artifacts through the environment's writer port.
    pub write_artifacts: bool,
    /// Default output directory for formatters without their own.
    pub out_dir: Option<std::path::PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            include_transforms: true,
            include_formatters: true,
            include_graphs: false,
            write_artifacts: false,
            out_dir: None,
        }
    }
}

/// Wall-clock stage timings for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub plan_ms: u64,
    pub resolve_ms: u64,
    pub dependency_ms: u64,
    pub transform_ms: Option<u64>,
    pub format_ms: Option<u64>,
    pub total_ms: u64,
}

/// Metrics computed over the flattened snapshot list.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildMetrics {
    pub source_count: usize,
    pub token_count: usize,
    /// Resolver-published parse time, falling back to resolve-stage time.
    pub parse_ms: u64,
}

/// Everything one run produced.
#[derive(Debug)]
pub struct BuildRunResult {
    pub run_id: Uuid,
    pub resolved: ResolvedPlan,
    /// Flattened snapshots, sorted by pointer.
    pub snapshots: Vec<TokenSnapshot>,
    pub metrics: BuildMetrics,
    pub dependency: DependencyEvaluation,
    pub transforms: Option<TransformStageResult>,
    pub formatters: Option<FormatterStageResult>,
    pub timings: StageTimings,
    /// The exported span tree; absent when the caller owns the session.
    pub telemetry: Option<SpanData>,
}

impl BuildRunResult {
    /// Engine-facing support for `build inspect`: the resolved snapshots
    /// restricted by a type/pointer selector.
    pub fn inspect(&self, selector: &crate::transforms::TokenSelector) -> Vec<&TokenSnapshot> {
        self.snapshots
            .iter()
            .filter(|snapshot| selector.matches(snapshot))
            .collect()
    }
}

/// Composes the pipeline stages.
pub struct PipelineOrchestrator {
    env: Arc<BuildEnvironment>,
}

impl PipelineOrchestrator {
    pub fn new(env: Arc<BuildEnvironment>) -> Self {
        Self { env }
    }

    /// Run the pipeline under its own telemetry session.
    pub async fn run(
        &self,
        options: BuildOptions,
        cancellation: CancellationToken,
    ) -> Result<BuildRunResult> {
        let session = TelemetrySession::new(SPAN_RUN, self.env.exporter.clone());
        let outcome = self
            .run_in_span(session.root(), options, cancellation)
            .await;
        // Spans are exported on success and failure alike.
        let telemetry = session.export().await;
        outcome.map(|mut result| {
            result.telemetry = Some(telemetry);
            result
        })
    }

    /// Run the pipeline with the run span already rooted by the caller
    /// (watch iterations). The caller owns span export.
    pub async fn run_in_span(
        &self,
        run_span: &Span,
        options: BuildOptions,
        cancellation: CancellationToken,
    ) -> Result<BuildRunResult> {
        let outcome = self
            .execute(run_span, &options, &cancellation)
            .await;
        match &outcome {
            Ok(_) => run_span.end(SpanStatus::Ok),
            Err(err) => {
                self.env.bus.publish(EngineEvent::Log(
                    LogEvent::error("dtifx.pipeline", "build.failed").with_data(json!({
                        "status": "error",
                        "error": {"name": error_name(err), "message": err.to_string()},
                    })),
                ));
                run_span.end(SpanStatus::Error);
            }
        }
        outcome
    }

    async fn execute(
        &self,
        run_span: &Span,
        options: &BuildOptions,
        cancellation: &CancellationToken,
    ) -> Result<BuildRunResult> {
        self.env.ensure_live()?;
        let run_id = Uuid::new_v4();
        let total_started = Instant::now();
        let config = &self.env.config.config;

        run_span.set_attribute("dtifx.run.id", json!(run_id.to_string()));
        run_span.set_attribute("dtifx.run.include_transforms", json!(options.include_transforms));
        run_span.set_attribute("dtifx.run.include_formatters", json!(options.include_formatters));

        // Registry lookups and option validation are configuration errors,
        // fatal before any stage span starts.
        let transform_entries = config
            .transforms
            .as_ref()
            .map(|t| t.entries.clone())
            .unwrap_or_default();
        let prepared_transforms: Vec<PreparedTransform> =
            self.env.transform_registry.prepare(&transform_entries)?;
        let formatter_plans: Vec<FormatterPlan> =
            self.env.formatter_registry.plan(&config.formatters)?;

        let mut timings = StageTimings::default();

        // plan
        let plan = {
            let span = self.start_stage(run_span, SPAN_PLAN);
            let started = Instant::now();
            let planner = self.env.planner();
            match planner.plan(config) {
                Ok(plan) => {
                    timings.plan_ms = started.elapsed().as_millis() as u64;
                    self.end_stage(
                        &span,
                        SPAN_PLAN,
                        timings.plan_ms,
                        BTreeMap::from([("dtifx.plan.entries".to_string(), json!(plan.entries.len()))]),
                    );
                    plan
                }
                Err(err) => return Err(self.fail_stage(span, SPAN_PLAN, err)),
            }
        };
        self.check_cancelled(cancellation, "resolve")?;

        // resolve
        let resolved = {
            let span = self.start_stage(run_span, SPAN_RESOLVE);
            let started = Instant::now();
            let mut session =
                ResolutionSession::new(self.env.token_cache.clone(), self.env.bus.clone());
            if options.include_graphs {
                session = session.with_graphs();
            }
            match session.resolve(&plan, cancellation) {
                Ok(resolved) => {
                    timings.resolve_ms = started.elapsed().as_millis() as u64;
                    let token_count: usize =
                        resolved.entries.iter().map(|e| e.tokens.len()).sum();
                    self.end_stage(
                        &span,
                        SPAN_RESOLVE,
                        timings.resolve_ms,
                        BTreeMap::from([("dtifx.resolve.tokens".to_string(), json!(token_count))]),
                    );
                    resolved
                }
                Err(err) => return Err(self.fail_stage(span, SPAN_RESOLVE, err)),
            }
        };

        // flatten (memory-only) + metrics
        let snapshots = resolved.flatten();
        let metrics = BuildMetrics {
            source_count: resolved.entries.len(),
            token_count: snapshots.len(),
            parse_ms: if resolved.parse_ms > 0 {
                resolved.parse_ms
            } else {
                timings.resolve_ms
            },
        };

        // dependency evaluate
        let tracker = DependencyTracker::new(self.env.dependency_store.clone());
        let dependency = tracker.evaluate(&snapshots);
        timings.dependency_ms = dependency.duration_ms;

        // transform
        self.check_cancelled(cancellation, "transform")?;
        let transforms = if options.include_transforms && !prepared_transforms.is_empty() {
            let span = self.start_stage(run_span, SPAN_TRANSFORM);
            let executor =
                TransformExecutor::new(self.env.transform_cache.clone(), self.env.bus.clone());
            match executor.execute(
                &snapshots,
                &prepared_transforms,
                &dependency.diff.changed,
                cancellation,
            ) {
                Ok(result) => {
                    timings.transform_ms = Some(result.duration_ms);
                    self.end_stage(
                        &span,
                        SPAN_TRANSFORM,
                        result.duration_ms,
                        BTreeMap::from([
                            ("dtifx.transform.hits".to_string(), json!(result.stats.hits)),
                            ("dtifx.transform.misses".to_string(), json!(result.stats.misses)),
                            ("dtifx.transform.skips".to_string(), json!(result.stats.skips)),
                        ]),
                    );
                    Some(result)
                }
                Err(err) => return Err(self.fail_stage(span, SPAN_TRANSFORM, err)),
            }
        } else {
            None
        };

        // format
        self.check_cancelled(cancellation, "format")?;
        let formatters = if options.include_formatters && !formatter_plans.is_empty() {
            let span = self.start_stage(run_span, SPAN_FORMAT);
            let writer = options
                .write_artifacts
                .then(|| self.env.writer.clone());
            let out_dir = options
                .out_dir
                .clone()
                .unwrap_or_else(|| self.env.config.directory.join("dist"));
            let executor = FormatterExecutor::new(writer, out_dir);
            match executor
                .execute(&snapshots, transforms.as_ref(), &formatter_plans, cancellation)
                .await
            {
                Ok(result) => {
                    timings.format_ms = Some(result.duration_ms);
                    self.end_stage(
                        &span,
                        SPAN_FORMAT,
                        result.duration_ms,
                        BTreeMap::from([
                            ("dtifx.format.artifacts".to_string(), json!(result.artifact_count())),
                            ("dtifx.format.writes".to_string(), json!(result.writes.len())),
                        ]),
                    );
                    Some(result)
                }
                Err(err) => return Err(self.fail_stage(span, SPAN_FORMAT, err)),
            }
        } else {
            None
        };

        // dependency commit, only on a fully successful run
        tracker
            .commit(&dependency.snapshot)
            .map_err(|err| DtifxError::DependencyCommit(err.to_string()))?;

        timings.total_ms = total_started.elapsed().as_millis() as u64;
        info!(
            "build completed: {} token(s) from {} source(s) in {}ms",
            metrics.token_count, metrics.source_count, timings.total_ms
        );
        self.env.bus.publish(EngineEvent::Log(
            LogEvent::info("dtifx.pipeline", "build.completed")
                .with_elapsed(timings.total_ms)
                .with_data(json!({
                    "tokens": metrics.token_count,
                    "changed": dependency.diff.changed.len(),
                })),
        ));

        Ok(BuildRunResult {
            run_id,
            resolved,
            snapshots,
            metrics,
            dependency,
            transforms,
            formatters,
            timings,
            telemetry: None,
        })
    }

    fn start_stage(&self, run_span: &Span, name: &str) -> Span {
        self.env
            .bus
            .publish(EngineEvent::StageStarted { stage: name.to_string() });
        run_span.start_child(name)
    }

    fn end_stage(
        &self,
        span: &Span,
        name: &str,
        duration_ms: u64,
        attributes: BTreeMap<String, serde_json::Value>,
    ) {
        span.end_with_attributes(SpanStatus::Ok, attributes);
        self.env.bus.publish(EngineEvent::StageCompleted {
            stage: name.to_string(),
            duration_ms,
        });
    }

    fn fail_stage(&self, span: Span, name: &str, err: DtifxError) -> DtifxError {
        span.end(SpanStatus::Error);
        self.env.bus.publish(EngineEvent::StageFailed {
            stage: name.to_string(),
            message: err.to_string(),
        });
        err
    }

    fn check_cancelled(&self, cancellation: &CancellationToken, stage: &str) -> Result<()> {
        if cancellation.is_cancelled() {
            return Err(DtifxError::Cancelled(stage.to_string()));
        }
        Ok(())
    }
}

fn error_name(err: &DtifxError) -> &'static str {
    match err {
        DtifxError::UnknownLayer { .. } => "UnknownLayerError",
        DtifxError::SourcePlanner { .. } => "SourcePlannerError",
        DtifxError::AliasCycle { .. } => "AliasCycleError",
        DtifxError::MissingAliasTarget { .. } => "MissingAliasTargetError",
        DtifxError::Cancelled(_) => "CancelledError",
        DtifxError::IOError(_) => "IOError",
        _ => "DtifxError",
    }
}
