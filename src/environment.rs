//! Build environment: ownership of caches, registries, the event bus and
//! telemetry wiring.
//!
//! An environment outlives individual runs; the caches it owns are what
//! make rebuilds incremental. Watch mode's configuration reload is an
//! explicit dispose-and-rebuild cycle, never an in-place mutation.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    cache::{
        dependency::DependencyStore, document::DocumentCache, token::TokenCacheStore,
        transform::TransformCache,
    },
    config::LoadedConfig,
    errors::{DtifxError, Result},
    events::{EventBus, telemetry::{NullExporter, TelemetryExporter}},
    formatters::FormatterRegistry,
    pipeline::{
        formatter::{ArtifactWriterPort, FsArtifactWriter},
        planner::{SourcePlanner, VirtualDocumentProducer},
    },
    transforms::TransformRegistry,
};

/// Owns the services shared across runs.
pub struct BuildEnvironment {
    pub config: LoadedConfig,
    pub bus: EventBus,
    pub document_cache: Arc<DocumentCache>,
    pub token_cache: Option<Arc<TokenCacheStore>>,
    pub transform_cache: Arc<TransformCache>,
    pub dependency_store: Arc<DependencyStore>,
    pub transform_registry: TransformRegistry,
    pub formatter_registry: FormatterRegistry,
    pub exporter: Arc<dyn TelemetryExporter>,
    pub writer: Arc<dyn ArtifactWriterPort>,
    producers: HashMap<String, Arc<dyn VirtualDocumentProducer>>,
    disposed: AtomicBool,
}

impl BuildEnvironment {
    /// Standard environment: persistent caches under the configuration's
    /// `.dtifx-cache/`, built-in registries, filesystem artifact writer.
    pub fn new(config: LoadedConfig) -> Self {
        let cache_dir = config.cache_dir();
        Self {
            bus: EventBus::new(),
            document_cache: Arc::new(DocumentCache::new()),
            token_cache: Some(Arc::new(TokenCacheStore::new(cache_dir.join("parser")))),
            transform_cache: Arc::new(TransformCache::persistent(cache_dir.join("transforms"))),
            dependency_store: Arc::new(DependencyStore::new(cache_dir.join("dependencies"))),
            transform_registry: TransformRegistry::with_builtins(),
            formatter_registry: FormatterRegistry::with_builtins(),
            exporter: Arc::new(NullExporter),
            writer: Arc::new(FsArtifactWriter),
            producers: HashMap::new(),
            disposed: AtomicBool::new(false),
            config,
        }
    }

    /// Environment without persistent caches, for tests and one-shot runs.
    pub fn ephemeral(config: LoadedConfig, scratch_dir: impl Into<PathBuf>) -> Self {
        let scratch = scratch_dir.into();
        Self {
            bus: EventBus::new(),
            document_cache: Arc::new(DocumentCache::new()),
            token_cache: None,
            transform_cache: Arc::new(TransformCache::in_memory()),
            dependency_store: Arc::new(DependencyStore::new(scratch.join("dependencies"))),
            transform_registry: TransformRegistry::with_builtins(),
            formatter_registry: FormatterRegistry::with_builtins(),
            exporter: Arc::new(NullExporter),
            writer: Arc::new(FsArtifactWriter),
            producers: HashMap::new(),
            disposed: AtomicBool::new(false),
            config,
        }
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn TelemetryExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn ArtifactWriterPort>) -> Self {
        self.writer = writer;
        self
    }

    /// Attach a programmatic producer for a virtual source id.
    pub fn register_producer(
        &mut self,
        source_id: impl Into<String>,
        producer: Arc<dyn VirtualDocumentProducer>,
    ) {
        self.producers.insert(source_id.into(), producer);
    }

    /// Construct the planner for one run.
    pub fn planner(&self) -> SourcePlanner {
        let mut planner = SourcePlanner::new(
            self.config.directory.clone(),
            self.document_cache.clone(),
            self.bus.clone(),
        );
        for (id, producer) in &self.producers {
            planner.register_producer(id.clone(), producer.clone());
        }
        planner
    }

    pub fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(DtifxError::EnvironmentDisposed);
        }
        Ok(())
    }

    /// Release the environment. Exactly-once: a second call is an error.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(DtifxError::EnvironmentDisposed);
        }
        self.document_cache.clear();
        Ok(())
    }
}
