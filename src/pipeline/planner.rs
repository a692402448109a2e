//! Source planner: expands configured sources into an ordered, deterministic
//! plan of validated entries.
//!
//! Expansion runs per-source in parallel, but the resulting entry list is
//! re-ordered by `(layerIndex, sourceId, fileIndex)` before returning, so a
//! plan over identical inputs is always byte-identical. Validation never
//! stops at the first failing source: every source's issues are collected
//! and raised together.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use walkdir::WalkDir;

use crate::{
    cache::document::DocumentCache,
    config::{BuildConfig, SourceConfig},
    diagnostics::{DiagnosticCategory, DiagnosticEvent, Severity},
    document::{DtifDocument, schema::ValidationIssue},
    errors::{DtifxError, Result},
    events::{EngineEvent, EventBus},
    pointer::TokenPointer,
};

/// Producer hook for virtual sources registered programmatically. The
/// config-file form wraps an inline document in [`InlineProducer`].
pub trait VirtualDocumentProducer: Send + Sync {
    fn produce(&self) -> Result<serde_json::Value>;
}

/// Producer returning a fixed inline document.
pub struct InlineProducer(pub serde_json::Value);

impl VirtualDocumentProducer for InlineProducer {
    fn produce(&self) -> Result<serde_json::Value> {
        Ok(self.0.clone())
    }
}

/// One resolved source: a validated document placed in the global
/// namespace.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub source_id: String,
    pub layer: String,
    pub layer_index: usize,
    pub uri: String,
    pub pointer_prefix: TokenPointer,
    pub document: Arc<DtifDocument>,
    pub context: BTreeMap<String, serde_json::Value>,
}

/// The ordered plan a single build will process.
#[derive(Debug)]
pub struct SourcePlan {
    pub entries: Vec<PlanEntry>,
}

/// Validation failures for one source, aggregated across the whole plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub source_id: String,
    pub uri: String,
    pub pointer_prefix: TokenPointer,
    pub errors: Vec<ValidationIssue>,
}

/// Expands and validates configured sources.
pub struct SourcePlanner {
    base_dir: PathBuf,
    document_cache: Arc<DocumentCache>,
    bus: EventBus,
    producers: HashMap<String, Arc<dyn VirtualDocumentProducer>>,
}

impl SourcePlanner {
    /// `base_dir` anchors relative source roots (the configuration
    /// directory).
    pub fn new(base_dir: impl Into<PathBuf>, document_cache: Arc<DocumentCache>, bus: EventBus) -> Self {
        Self {
            base_dir: base_dir.into(),
            document_cache,
            bus,
            producers: HashMap::new(),
        }
    }

    /// Override the producer for a virtual source id. Without an override
    /// the source's inline document is used.
    pub fn register_producer(
        &mut self,
        source_id: impl Into<String>,
        producer: Arc<dyn VirtualDocumentProducer>,
    ) {
        self.producers.insert(source_id.into(), producer);
    }

    /// Expand every source into plan entries, or fail with the aggregated
    /// per-source issues.
    pub fn plan(&self, config: &BuildConfig) -> Result<SourcePlan> {
        let layers = build_layer_map(config)?;

        // Expand sources in parallel; each expansion yields either entries
        // or a failure. Source order is preserved by indexed collection.
        let expansions: Vec<(usize, std::result::Result<Vec<PlanEntry>, SourceFailure>)> = config
            .sources
            .par_iter()
            .enumerate()
            .map(|(index, source)| (index, self.expand_source(source, &layers)))
            .collect();

        let mut entries = Vec::new();
        let mut failures = Vec::new();
        let mut ordered = expansions;
        ordered.sort_by_key(|(index, _)| *index);
        for (_, expansion) in ordered {
            match expansion {
                Ok(mut source_entries) => entries.append(&mut source_entries),
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                for issue in &failure.errors {
                    self.bus.publish(EngineEvent::Diagnostic(
                        DiagnosticEvent::new(
                            Severity::Error,
                            "planner",
                            issue.keyword.clone(),
                            DiagnosticCategory::TokenSource,
                            format!("{} ({})", issue.message, failure.uri),
                        )
                        .with_related(vec![failure.source_id.clone()]),
                    ));
                }
            }
            return Err(DtifxError::SourcePlanner { failures });
        }

        // Total order: (layerIndex, sourceId, fileIndex). Entries from one
        // source keep their expansion order, which encodes the file index.
        let mut indexed: Vec<(usize, PlanEntry)> = entries.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            (a.layer_index, &a.source_id, ia).cmp(&(b.layer_index, &b.source_id, ib))
        });
        let entries = indexed.into_iter().map(|(_, entry)| entry).collect();

        Ok(SourcePlan { entries })
    }

    fn expand_source(
        &self,
        source: &SourceConfig,
        layers: &BTreeMap<String, LayerInfo>,
    ) -> std::result::Result<Vec<PlanEntry>, SourceFailure> {
        let layer_info = match resolve_layer(source, layers) {
            Ok(info) => info,
            Err(DtifxError::UnknownLayer { layer, .. }) => {
                return Err(SourceFailure {
                    source_id: source.id().to_string(),
                    uri: source_uri_hint(source, &self.base_dir),
                    pointer_prefix: pointer_prefix_of(source),
                    errors: vec![ValidationIssue::new(
                        "layer",
                        format!("Unknown layer `{layer}`"),
                        None,
                    )],
                });
            }
            Err(_) => unreachable!("resolve_layer only fails with UnknownLayer"),
        };

        match source {
            SourceConfig::File {
                id,
                layer,
                root_dir,
                patterns,
                ignore,
                pointer_prefix,
                context,
            } => self.expand_file_source(
                id,
                layer,
                layer_info.index,
                root_dir,
                patterns,
                ignore,
                pointer_prefix.clone().unwrap_or_else(TokenPointer::root),
                &layer_info.merged_context(context),
            ),
            SourceConfig::Virtual {
                id,
                layer,
                document,
                pointer_prefix,
                context,
            } => self.expand_virtual_source(
                id,
                layer,
                layer_info.index,
                document,
                pointer_prefix.clone().unwrap_or_else(TokenPointer::root),
                &layer_info.merged_context(context),
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_file_source(
        &self,
        id: &str,
        layer: &str,
        layer_index: usize,
        root_dir: &Path,
        patterns: &[String],
        ignore: &[String],
        pointer_prefix: TokenPointer,
        context: &BTreeMap<String, serde_json::Value>,
    ) -> std::result::Result<Vec<PlanEntry>, SourceFailure> {
        let root = if root_dir.is_absolute() {
            root_dir.to_path_buf()
        } else {
            self.base_dir.join(root_dir)
        };

        let fail = |errors: Vec<ValidationIssue>| SourceFailure {
            source_id: id.to_string(),
            uri: root.display().to_string(),
            pointer_prefix: pointer_prefix.clone(),
            errors,
        };

        let include = build_globset(patterns)
            .map_err(|message| fail(vec![ValidationIssue::new("pattern", message, None)]))?;
        let exclude = build_globset(ignore)
            .map_err(|message| fail(vec![ValidationIssue::new("ignore", message, None)]))?;

        let mut files: Vec<PathBuf> = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&root).ok()?.to_path_buf();
                (include.is_match(&relative) && !exclude.is_match(&relative))
                    .then(|| entry.path().to_path_buf())
            })
            .collect();
        files.sort();

        let mut entries = Vec::with_capacity(files.len());
        let mut errors = Vec::new();
        let mut failing_uri = None;

        for file in files {
            let uri = file_uri(&file);
            let load = || {
                let bytes = std::fs::read(&file)?;
                DtifDocument::from_bytes(&uri, &bytes).map_err(|issues| {
                    DtifxError::InvalidDocument {
                        uri: uri.clone(),
                        message: serde_json::to_string(&issues).unwrap_or_default(),
                    }
                })
            };
            match self.document_cache.get_or_load(&uri, load) {
                Ok(document) => entries.push(PlanEntry {
                    source_id: id.to_string(),
                    layer: layer.to_string(),
                    layer_index,
                    uri,
                    pointer_prefix: pointer_prefix.clone(),
                    document,
                    context: context.clone(),
                }),
                Err(DtifxError::InvalidDocument { uri, message }) => {
                    // Re-expand the issue list collected at parse time.
                    let issues: Vec<ValidationIssue> =
                        serde_json::from_str(&message).unwrap_or_else(|_| {
                            vec![ValidationIssue::new("document", message.clone(), None)]
                        });
                    failing_uri.get_or_insert(uri);
                    errors.extend(issues);
                }
                Err(err) => {
                    failing_uri.get_or_insert(uri);
                    errors.push(ValidationIssue::new("io", err.to_string(), None));
                }
            }
        }

        if !errors.is_empty() {
            debug!("source `{id}` failed validation with {} issue(s)", errors.len());
            return Err(SourceFailure {
                source_id: id.to_string(),
                uri: failing_uri.unwrap_or_else(|| root.display().to_string()),
                pointer_prefix,
                errors,
            });
        }
        Ok(entries)
    }

    fn expand_virtual_source(
        &self,
        id: &str,
        layer: &str,
        layer_index: usize,
        inline: &serde_json::Value,
        pointer_prefix: TokenPointer,
        context: &BTreeMap<String, serde_json::Value>,
    ) -> std::result::Result<Vec<PlanEntry>, SourceFailure> {
        let uri = format!("virtual://{id}");
        let fail = |errors: Vec<ValidationIssue>| SourceFailure {
            source_id: id.to_string(),
            uri: uri.clone(),
            pointer_prefix: pointer_prefix.clone(),
            errors,
        };

        // A registered producer overrides the inline document; it is
        // invoked exactly once per plan.
        let value = match self.producers.get(id) {
            Some(producer) => producer
                .produce()
                .map_err(|err| fail(vec![ValidationIssue::new("producer", err.to_string(), None)]))?,
            None => inline.clone(),
        };

        let document = DtifDocument::from_value(&uri, value).map_err(|issues| fail(issues))?;
        Ok(vec![PlanEntry {
            source_id: id.to_string(),
            layer: layer.to_string(),
            layer_index,
            uri,
            pointer_prefix,
            document: Arc::new(document),
            context: context.clone(),
        }])
    }
}

/// A declared layer: its declaration index plus context tags.
struct LayerInfo {
    index: usize,
    context: BTreeMap<String, serde_json::Value>,
}

impl LayerInfo {
    /// Layer context merged with source context; the source wins.
    fn merged_context(
        &self,
        source_context: &BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, serde_json::Value> {
        let mut merged = self.context.clone();
        merged.extend(source_context.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Declaration-order layer map; duplicate names are configuration errors.
fn build_layer_map(config: &BuildConfig) -> Result<BTreeMap<String, LayerInfo>> {
    let mut layers = BTreeMap::new();
    for (index, layer) in config.layers.iter().enumerate() {
        let info = LayerInfo {
            index,
            context: layer.context.clone(),
        };
        if layers.insert(layer.name.clone(), info).is_some() {
            return Err(DtifxError::Duplicate {
                kind: "layer",
                name: layer.name.clone(),
            });
        }
    }
    Ok(layers)
}

fn resolve_layer<'a>(
    source: &SourceConfig,
    layers: &'a BTreeMap<String, LayerInfo>,
) -> Result<&'a LayerInfo> {
    layers
        .get(source.layer())
        .ok_or_else(|| DtifxError::UnknownLayer {
            source_id: source.id().to_string(),
            layer: source.layer().to_string(),
        })
}

fn pointer_prefix_of(source: &SourceConfig) -> TokenPointer {
    match source {
        SourceConfig::File { pointer_prefix, .. } | SourceConfig::Virtual { pointer_prefix, .. } => {
            pointer_prefix.clone().unwrap_or_else(TokenPointer::root)
        }
    }
}

fn source_uri_hint(source: &SourceConfig, base_dir: &Path) -> String {
    match source {
        SourceConfig::File { root_dir, .. } => {
            if root_dir.is_absolute() {
                root_dir.display().to_string()
            } else {
                base_dir.join(root_dir).display().to_string()
            }
        }
        SourceConfig::Virtual { id, .. } => format!("virtual://{id}"),
    }
}

fn build_globset(patterns: &[String]) -> std::result::Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| e.to_string())?);
    }
    builder.build().map_err(|e| e.to_string())
}

fn file_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("file://{}", path.display()))
}
