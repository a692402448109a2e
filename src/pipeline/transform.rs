//! Transformation executor: runs every prepared transform against every
//! snapshot, consulting the content-addressed cache.
//!
//! Work is scheduled per pointer on a pool bounded by the core count;
//! transforms for distinct pointers are independent. The result list is
//! re-sorted by `(transformId, pointer)` afterwards so output order never
//! depends on scheduling.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
    time::Instant,
};

use threadpool::ThreadPool;
use tracing::debug;

use crate::{
    cache::{CacheStatus, transform::TransformCache},
    diagnostics::{DiagnosticCategory, DiagnosticEvent, Severity},
    digest::TokenDigest,
    errors::{DtifxError, Result},
    events::{EngineEvent, EventBus},
    model::TokenSnapshot,
    pipeline::{CancellationToken, tracker::snapshot_digest},
    pointer::TokenPointer,
    transforms::PreparedTransform,
};

/// One (transform × snapshot) outcome.
#[derive(Debug, Clone)]
pub struct TransformExecution {
    pub transform: String,
    pub pointer: TokenPointer,
    pub snapshot: TokenSnapshot,
    /// `None` for selector skips.
    pub output: Option<serde_json::Value>,
    pub group: String,
    pub options_hash: TokenDigest,
    pub cache_status: CacheStatus,
}

/// Aggregate cache counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformCacheStats {
    pub hits: usize,
    pub misses: usize,
    pub skips: usize,
}

/// The transform stage result.
#[derive(Debug)]
pub struct TransformStageResult {
    pub executions: Vec<TransformExecution>,
    pub stats: TransformCacheStats,
    pub duration_ms: u64,
}

impl TransformStageResult {
    /// Outputs for one pointer, keyed by transform id. Skips are omitted.
    pub fn outputs_for(
        &self,
        pointer: &TokenPointer,
    ) -> std::collections::BTreeMap<String, serde_json::Value> {
        self.executions
            .iter()
            .filter(|execution| &execution.pointer == pointer)
            .filter_map(|execution| {
                execution
                    .output
                    .clone()
                    .map(|output| (execution.transform.clone(), output))
            })
            .collect()
    }
}

/// Runs prepared transforms over the snapshot set.
pub struct TransformExecutor {
    cache: Arc<TransformCache>,
    bus: EventBus,
    pool: Arc<ThreadPool>,
}

impl TransformExecutor {
    pub fn new(cache: Arc<TransformCache>, bus: EventBus) -> Self {
        let workers = num_cpus::get().max(1);
        Self {
            cache,
            bus,
            pool: Arc::new(ThreadPool::new(workers)),
        }
    }

    /// Execute all transforms. `changed_pointers` gates cache reuse: an
    /// unchanged pointer with a cache entry is a hit; everything else
    /// computes.
    pub fn execute(
        &self,
        snapshots: &[TokenSnapshot],
        transforms: &[PreparedTransform],
        changed_pointers: &BTreeSet<TokenPointer>,
        cancellation: &CancellationToken,
    ) -> Result<TransformStageResult> {
        let started = Instant::now();
        let executions = Arc::new(Mutex::new(Vec::new()));
        let first_error: Arc<Mutex<Option<DtifxError>>> = Arc::new(Mutex::new(None));

        for snapshot in snapshots {
            if cancellation.is_cancelled() {
                break;
            }
            let snapshot = snapshot.clone();
            let transforms: Vec<PreparedTransform> = transforms.to_vec();
            let changed = changed_pointers.contains(&snapshot.pointer);
            let cache = self.cache.clone();
            let bus = self.bus.clone();
            let executions = executions.clone();
            let first_error = first_error.clone();

            self.pool.execute(move || {
                // A prior failure makes further work pointless.
                if first_error.lock().expect("executor lock poisoned").is_some() {
                    return;
                }
                for prepared in &transforms {
                    match run_one(&cache, prepared, &snapshot, changed) {
                        Ok(execution) => {
                            executions
                                .lock()
                                .expect("executor lock poisoned")
                                .push(execution);
                        }
                        Err(err) => {
                            bus.publish(EngineEvent::Diagnostic(
                                DiagnosticEvent::new(
                                    Severity::Error,
                                    "transform",
                                    "transform-failed",
                                    DiagnosticCategory::PipelineTransform,
                                    err.to_string(),
                                )
                                .with_pointer(snapshot.pointer.clone()),
                            ));
                            let mut slot =
                                first_error.lock().expect("executor lock poisoned");
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            return;
                        }
                    }
                }
            });
        }

        self.pool.join();

        if cancellation.is_cancelled() {
            return Err(DtifxError::Cancelled("transform".into()));
        }
        if let Some(err) = first_error.lock().expect("executor lock poisoned").take() {
            return Err(err);
        }

        let mut executions = Arc::try_unwrap(executions)
            .map(|mutex| mutex.into_inner().expect("executor lock poisoned"))
            .unwrap_or_else(|shared| shared.lock().expect("executor lock poisoned").clone());
        executions.sort_by(|a, b| {
            (&a.transform, &a.pointer).cmp(&(&b.transform, &b.pointer))
        });

        let mut stats = TransformCacheStats::default();
        for execution in &executions {
            match execution.cache_status {
                CacheStatus::Hit => stats.hits += 1,
                CacheStatus::Miss => stats.misses += 1,
                CacheStatus::Skip => stats.skips += 1,
            }
        }
        debug!(
            "transform stage: {} hit / {} miss / {} skip",
            stats.hits, stats.misses, stats.skips
        );

        Ok(TransformStageResult {
            executions,
            stats,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn run_one(
    cache: &TransformCache,
    prepared: &PreparedTransform,
    snapshot: &TokenSnapshot,
    changed: bool,
) -> Result<TransformExecution> {
    let group = prepared.definition.group().to_string();
    if !prepared.definition.selector().matches(snapshot) {
        return Ok(TransformExecution {
            transform: prepared.id.clone(),
            pointer: snapshot.pointer.clone(),
            snapshot: snapshot.clone(),
            output: None,
            group,
            options_hash: prepared.options_hash,
            cache_status: CacheStatus::Skip,
        });
    }

    let input_hash = snapshot_digest(snapshot);
    let key = TransformCache::key(
        &prepared.id,
        snapshot.pointer.as_str(),
        &input_hash,
        &prepared.options_hash,
    );

    if !changed
        && let Some(output) = cache.get(&key)
    {
        return Ok(TransformExecution {
            transform: prepared.id.clone(),
            pointer: snapshot.pointer.clone(),
            snapshot: snapshot.clone(),
            output: Some(output),
            group,
            options_hash: prepared.options_hash,
            cache_status: CacheStatus::Hit,
        });
    }

    let output = prepared.definition.apply(snapshot)?;
    cache.put(key, output.clone());
    Ok(TransformExecution {
        transform: prepared.id.clone(),
        pointer: snapshot.pointer.clone(),
        snapshot: snapshot.clone(),
        output: Some(output),
        group,
        options_hash: prepared.options_hash,
        cache_status: CacheStatus::Miss,
    })
}
