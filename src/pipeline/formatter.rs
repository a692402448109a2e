//! Formatter executor: runs each formatter plan against the resolved
//! snapshots joined with transform outputs, collects artifacts, and
//! optionally writes them through the artifact writer port.
//!
//! Plans run sequentially in configured order because they share one
//! namespace of output paths; within a single plan, writes to distinct
//! paths are overlapped.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::{
    errors::{DtifxError, Result},
    formatters::{Artifact, FormatterPlan, FormatterToken, join_token},
    model::TokenSnapshot,
    pipeline::{CancellationToken, transform::TransformStageResult},
};

/// Writer port owning the output tree for the duration of a build.
#[async_trait]
pub trait ArtifactWriterPort: Send + Sync {
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// Default writer backed by the local filesystem.
pub struct FsArtifactWriter;

#[async_trait]
impl ArtifactWriterPort for FsArtifactWriter {
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}

/// One formatter plan's outcome.
#[derive(Debug)]
pub struct FormatterExecution {
    pub id: String,
    pub name: String,
    pub artifacts: Vec<Artifact>,
    pub duration_ms: u64,
}

/// The formatter stage result.
#[derive(Debug)]
pub struct FormatterStageResult {
    pub executions: Vec<FormatterExecution>,
    /// Absolute paths written through the writer port, in write order.
    pub writes: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl FormatterStageResult {
    pub fn artifact_count(&self) -> usize {
        self.executions.iter().map(|e| e.artifacts.len()).sum()
    }
}

/// Drives formatter plans.
pub struct FormatterExecutor {
    writer: Option<Arc<dyn ArtifactWriterPort>>,
    default_out_dir: PathBuf,
}

impl FormatterExecutor {
    /// Without a writer the executor only collects artifacts in memory.
    pub fn new(writer: Option<Arc<dyn ArtifactWriterPort>>, default_out_dir: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            default_out_dir: default_out_dir.into(),
        }
    }

    pub async fn execute(
        &self,
        snapshots: &[TokenSnapshot],
        transforms: Option<&TransformStageResult>,
        plans: &[FormatterPlan],
        cancellation: &CancellationToken,
    ) -> Result<FormatterStageResult> {
        let started = Instant::now();
        let mut executions = Vec::with_capacity(plans.len());
        let mut writes = Vec::new();

        for plan in plans {
            if cancellation.is_cancelled() {
                return Err(DtifxError::Cancelled("format".into()));
            }
            let plan_started = Instant::now();

            let selector = plan.definition.selector();
            let tokens: Vec<FormatterToken> = snapshots
                .iter()
                .filter(|snapshot| selector.matches(snapshot))
                .map(|snapshot| {
                    let outputs = transforms
                        .map(|stage| stage.outputs_for(&snapshot.pointer))
                        .unwrap_or_default();
                    join_token(snapshot, outputs)
                })
                .collect();

            let artifacts = plan
                .definition
                .run(&tokens, &plan.output)
                .map_err(|err| DtifxError::Formatter {
                    formatter: plan.id.clone(),
                    message: err.to_string(),
                })?;

            if let Some(writer) = &self.writer {
                let out_dir = plan
                    .output
                    .out_dir
                    .clone()
                    .unwrap_or_else(|| self.default_out_dir.clone());
                // Distinct paths within one formatter may be written
                // concurrently.
                let pending: Vec<_> = artifacts
                    .iter()
                    .map(|artifact| {
                        let target = out_dir.join(&artifact.path);
                        let writer = writer.clone();
                        let contents = artifact.contents.clone().into_bytes();
                        async move {
                            match writer.write(&target, &contents).await {
                                Ok(()) => Ok(target),
                                Err(err) => Err(DtifxError::ArtifactWrite {
                                    path: target.display().to_string(),
                                    message: err.to_string(),
                                }),
                            }
                        }
                    })
                    .collect();
                for written in join_all(pending).await {
                    writes.push(written?);
                }
            }

            debug!(
                "formatter `{}` produced {} artifact(s)",
                plan.id,
                artifacts.len()
            );
            executions.push(FormatterExecution {
                id: plan.id.clone(),
                name: plan.name.clone(),
                artifacts,
                duration_ms: plan_started.elapsed().as_millis() as u64,
            });
        }

        Ok(FormatterStageResult {
            executions,
            writes,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{FormatterExecutor, FsArtifactWriter};
    use crate::{
        config::FormatterConfig,
        formatters::FormatterRegistry,
        pipeline::CancellationToken,
        testutil::sample_snapshot,
    };

    fn plans(configs: &[FormatterConfig]) -> Vec<crate::formatters::FormatterPlan> {
        FormatterRegistry::with_builtins().plan(configs).unwrap()
    }

    /// Without a writer, artifacts are collected but nothing is written.
    #[tokio::test]
    async fn collects_without_writer() {
        let executor = FormatterExecutor::new(None, "dist");
        let snapshots = vec![sample_snapshot("#/color/a", json!("#111111"))];
        let result = executor
            .execute(
                &snapshots,
                None,
                &plans(&[FormatterConfig {
                    name: "css.variables".into(),
                    output: None,
                    options: None,
                }]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.executions.len(), 1);
        assert_eq!(result.executions[0].id, "css.variables");
        assert_eq!(result.artifact_count(), 1);
        assert!(result.writes.is_empty());
    }

    /// With a writer, artifacts land under outDir and the absolute paths
    /// are tracked.
    #[tokio::test]
    async fn writes_under_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let executor = FormatterExecutor::new(Some(Arc::new(FsArtifactWriter)), dir.path());
        let snapshots = vec![sample_snapshot("#/color/a", json!("#111111"))];
        let result = executor
            .execute(
                &snapshots,
                None,
                &plans(&[FormatterConfig {
                    name: "css.variables".into(),
                    output: None,
                    options: None,
                }]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.writes.len(), 1);
        let written = std::fs::read_to_string(&result.writes[0]).unwrap();
        assert!(written.contains("--color-a: #111111;"));
        assert!(result.writes[0].starts_with(dir.path()));
    }

    /// Plans run sequentially in configured order.
    #[tokio::test]
    async fn plans_run_in_order() {
        let executor = FormatterExecutor::new(None, "dist");
        let snapshots = vec![sample_snapshot("#/color/a", json!("#111111"))];
        let result = executor
            .execute(
                &snapshots,
                None,
                &plans(&[
                    FormatterConfig {
                        name: "json.tokens".into(),
                        output: None,
                        options: None,
                    },
                    FormatterConfig {
                        name: "css.variables".into(),
                        output: None,
                        options: None,
                    },
                ]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = result.executions.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["json.tokens", "css.variables"]);
    }
}
