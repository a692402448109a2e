//! Resolution session: parses planned documents into pre-alias tokens,
//! builds the alias graph in the global namespace, and resolves every token
//! to a concrete value with provenance.
//!
//! Later layers override earlier ones at the same pointer; two sources in
//! the same layer claiming one pointer is fatal. Alias resolution walks the
//! `$ref` graph depth-first, failing on missing targets and on cycles.

use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde_json::Value;
use tracing::debug;

use crate::{
    cache::token::TokenCacheStore,
    diagnostics::{DiagnosticCategory, DiagnosticEvent, Severity},
    errors::{DtifxError, Result},
    events::{EngineEvent, EventBus},
    model::{Provenance, ResolutionInfo, SnapshotId, Token, TokenMetadata, TokenSnapshot, TokenType},
    pipeline::{CancellationToken, planner::{PlanEntry, SourcePlan}},
    pointer::TokenPointer,
};

/// One plan entry together with its resolved tokens, in document order.
#[derive(Debug)]
pub struct ResolvedEntry {
    pub entry: PlanEntry,
    pub tokens: Vec<TokenSnapshot>,
}

/// Alias edges retained when graph output is requested.
#[derive(Debug, Clone, Default)]
pub struct TokenGraph {
    pub edges: Vec<(TokenPointer, TokenPointer)>,
}

/// The resolver's output for a whole plan.
#[derive(Debug)]
pub struct ResolvedPlan {
    pub entries: Vec<ResolvedEntry>,
    pub diagnostics: Vec<DiagnosticEvent>,
    pub resolved_at: DateTime<Utc>,
    /// Total per-document parse/walk time.
    pub parse_ms: u64,
    pub graph: Option<TokenGraph>,
}

impl ResolvedPlan {
    /// All snapshots flattened and sorted by pointer.
    pub fn flatten(&self) -> Vec<TokenSnapshot> {
        let mut snapshots: Vec<TokenSnapshot> = self
            .entries
            .iter()
            .flat_map(|entry| entry.tokens.iter().cloned())
            .collect();
        snapshots.sort_by(|a, b| a.pointer.cmp(&b.pointer));
        snapshots
    }
}

/// A pre-alias node in the global namespace.
struct GraphNode {
    entry_index: usize,
    walk_index: usize,
    pointer: TokenPointer,
    source_pointer: TokenPointer,
    token_type: Option<TokenType>,
    value: Option<Value>,
    reference: Option<TokenPointer>,
    metadata: Option<TokenMetadata>,
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

struct ResolvedNode {
    value: Value,
    token_type: TokenType,
    chain: Vec<SnapshotId>,
}

/// Parses and resolves a source plan.
pub struct ResolutionSession {
    token_cache: Option<Arc<TokenCacheStore>>,
    bus: EventBus,
    include_graphs: bool,
}

impl ResolutionSession {
    pub fn new(token_cache: Option<Arc<TokenCacheStore>>, bus: EventBus) -> Self {
        Self {
            token_cache,
            bus,
            include_graphs: false,
        }
    }

    /// Retain the alias edge set on the resolved plan.
    pub fn with_graphs(mut self) -> Self {
        self.include_graphs = true;
        self
    }

    pub fn resolve(
        &self,
        plan: &SourcePlan,
        cancellation: &CancellationToken,
    ) -> Result<ResolvedPlan> {
        let parse_started = Instant::now();

        // Walk every document into pre-alias tokens; cached resolver output
        // short-circuits the walk when the document revision matches.
        let walks: Vec<Vec<GraphNode>> = plan
            .entries
            .par_iter()
            .enumerate()
            .map(|(entry_index, entry)| self.walk_entry(entry_index, entry))
            .collect();
        let parse_ms = parse_started.elapsed().as_millis() as u64;

        if cancellation.is_cancelled() {
            return Err(DtifxError::Cancelled("resolve".into()));
        }

        // Global namespace with layer overrides: the highest layer index
        // wins a pointer; a tie is fatal.
        let mut winners: HashMap<TokenPointer, usize> = HashMap::new();
        let mut nodes: Vec<GraphNode> = Vec::new();
        for walk in walks {
            for node in walk {
                match winners.get(&node.pointer).copied() {
                    None => {
                        winners.insert(node.pointer.clone(), nodes.len());
                        nodes.push(node);
                    }
                    Some(existing_index) => {
                        let existing = &nodes[existing_index];
                        let existing_layer = plan.entries[existing.entry_index].layer_index;
                        let incoming_layer = plan.entries[node.entry_index].layer_index;
                        if incoming_layer == existing_layer {
                            return Err(DtifxError::DuplicatePointer {
                                pointer: node.pointer.to_string(),
                                first: plan.entries[existing.entry_index].source_id.clone(),
                                second: plan.entries[node.entry_index].source_id.clone(),
                            });
                        }
                        if incoming_layer > existing_layer {
                            debug!(
                                "layer override: {} supersedes {} at {}",
                                plan.entries[node.entry_index].source_id,
                                plan.entries[existing.entry_index].source_id,
                                node.pointer
                            );
                            nodes[existing_index] = node;
                        }
                    }
                }
            }
        }

        let index_of: HashMap<TokenPointer, SnapshotId> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.pointer.clone(), index as SnapshotId))
            .collect();

        // Resolve aliases depth-first in deterministic pointer order.
        let mut order: Vec<SnapshotId> = (0..nodes.len() as SnapshotId).collect();
        order.sort_by(|a, b| nodes[*a as usize].pointer.cmp(&nodes[*b as usize].pointer));

        let mut states = vec![VisitState::Unvisited; nodes.len()];
        let mut resolved: Vec<Option<ResolvedNode>> = Vec::new();
        resolved.resize_with(nodes.len(), || None);
        let mut diagnostics = Vec::new();

        for id in order {
            self.resolve_node(id, &nodes, &index_of, &mut states, &mut resolved, &mut Vec::new())
                .inspect_err(|err| {
                    let diagnostic = fatal_diagnostic(err);
                    self.bus.publish(EngineEvent::Diagnostic(diagnostic.clone()));
                    diagnostics.push(diagnostic);
                })?;
        }

        let graph = self.include_graphs.then(|| TokenGraph {
            edges: nodes
                .iter()
                .filter_map(|node| {
                    node.reference
                        .as_ref()
                        .map(|target| (node.pointer.clone(), target.clone()))
                })
                .collect(),
        });

        // Assemble snapshots per entry, preserving document walk order.
        let mut per_entry: Vec<Vec<(usize, TokenSnapshot)>> = Vec::new();
        per_entry.resize_with(plan.entries.len(), Vec::new);
        for (index, node) in nodes.iter().enumerate() {
            let outcome = resolved[index]
                .as_ref()
                .expect("all winning nodes are resolved");
            let entry = &plan.entries[node.entry_index];
            let snapshot = build_snapshot(node, outcome, entry, &nodes);
            per_entry[node.entry_index].push((node.walk_index, snapshot));
        }

        let mut entries = Vec::with_capacity(plan.entries.len());
        for (entry_index, mut tokens) in per_entry.into_iter().enumerate() {
            tokens.sort_by_key(|(walk_index, _)| *walk_index);
            let tokens: Vec<TokenSnapshot> =
                tokens.into_iter().map(|(_, snapshot)| snapshot).collect();
            let entry = plan.entries[entry_index].clone();
            if let Some(cache) = &self.token_cache
                && let Err(err) = cache.store(&entry.uri, &entry.document.content_hash, &tokens)
            {
                debug!("token cache store failed for {}: {err}", entry.uri);
            }
            entries.push(ResolvedEntry { entry, tokens });
        }

        Ok(ResolvedPlan {
            entries,
            diagnostics,
            resolved_at: Utc::now(),
            parse_ms,
            graph,
        })
    }

    /// Walk one entry into graph nodes, consulting the token cache first.
    fn walk_entry(&self, entry_index: usize, entry: &PlanEntry) -> Vec<GraphNode> {
        if let Some(cache) = &self.token_cache
            && let Some(snapshots) = cache.load(&entry.uri, &entry.document.content_hash)
        {
            return snapshots
                .into_iter()
                .enumerate()
                .map(|(walk_index, snapshot)| node_from_cached(entry_index, walk_index, snapshot))
                .collect();
        }

        let local_pointers: std::collections::HashSet<TokenPointer> = entry
            .document
            .tokens()
            .into_iter()
            .map(|raw| raw.pointer)
            .collect();

        entry
            .document
            .tokens()
            .into_iter()
            .enumerate()
            .map(|(walk_index, raw)| {
                // Local references follow the entry's prefix into the global
                // namespace; anything else is taken as already global.
                let reference = raw.reference.map(|target| {
                    if local_pointers.contains(&target) {
                        target.with_prefix(&entry.pointer_prefix)
                    } else {
                        target
                    }
                });
                GraphNode {
                    entry_index,
                    walk_index,
                    pointer: raw.pointer.with_prefix(&entry.pointer_prefix),
                    source_pointer: raw.pointer,
                    token_type: raw.token_type,
                    value: raw.value,
                    reference,
                    metadata: raw.metadata,
                }
            })
            .collect()
    }

    #[allow(clippy::only_used_in_recursion)]
    fn resolve_node(
        &self,
        id: SnapshotId,
        nodes: &[GraphNode],
        index_of: &HashMap<TokenPointer, SnapshotId>,
        states: &mut [VisitState],
        resolved: &mut [Option<ResolvedNode>],
        stack: &mut Vec<SnapshotId>,
    ) -> Result<()> {
        match states[id as usize] {
            VisitState::Done => return Ok(()),
            VisitState::InProgress => {
                let mut path: Vec<String> = stack
                    .iter()
                    .skip_while(|ancestor| **ancestor != id)
                    .map(|ancestor| nodes[*ancestor as usize].pointer.to_string())
                    .collect();
                path.push(nodes[id as usize].pointer.to_string());
                return Err(DtifxError::AliasCycle { path });
            }
            VisitState::Unvisited => {}
        }

        states[id as usize] = VisitState::InProgress;
        stack.push(id);

        let node = &nodes[id as usize];
        let outcome = match &node.reference {
            None => {
                let value = node.value.clone().unwrap_or(Value::Null);
                ResolvedNode {
                    value,
                    token_type: node
                        .token_type
                        .clone()
                        .unwrap_or_else(|| TokenType::new("unknown")),
                    chain: vec![id],
                }
            }
            Some(target) => {
                let target_id =
                    *index_of
                        .get(target)
                        .ok_or_else(|| DtifxError::MissingAliasTarget {
                            pointer: node.pointer.to_string(),
                            target: target.to_string(),
                        })?;
                self.resolve_node(target_id, nodes, index_of, states, resolved, stack)?;
                let target_outcome = resolved[target_id as usize]
                    .as_ref()
                    .expect("target resolved by recursive call");
                let mut chain = vec![id];
                chain.extend(&target_outcome.chain);
                ResolvedNode {
                    value: target_outcome.value.clone(),
                    token_type: node
                        .token_type
                        .clone()
                        .unwrap_or_else(|| target_outcome.token_type.clone()),
                    chain,
                }
            }
        };

        stack.pop();
        states[id as usize] = VisitState::Done;
        resolved[id as usize] = Some(outcome);
        Ok(())
    }
}

fn build_snapshot(
    node: &GraphNode,
    outcome: &ResolvedNode,
    entry: &PlanEntry,
    nodes: &[GraphNode],
) -> TokenSnapshot {
    let chain_pointers: Vec<TokenPointer> = outcome
        .chain
        .iter()
        .map(|id| nodes[*id as usize].pointer.clone())
        .collect();
    let raw = match (&node.value, &node.reference) {
        (Some(value), _) => value.clone(),
        (None, Some(target)) => serde_json::json!({"$ref": target.as_str()}),
        (None, None) => Value::Null,
    };

    TokenSnapshot {
        pointer: node.pointer.clone(),
        source_pointer: node.source_pointer.clone(),
        token: Token {
            token_type: outcome.token_type.clone(),
            value: outcome.value.clone(),
            raw,
        },
        resolution: ResolutionInfo {
            value: outcome.value.clone(),
            references: node.reference.clone().into_iter().collect(),
            resolution_path: chain_pointers.clone(),
            applied_aliases: chain_pointers,
        },
        provenance: Provenance {
            source_id: entry.source_id.clone(),
            layer: entry.layer.clone(),
            layer_index: entry.layer_index,
            uri: entry.uri.clone(),
            pointer_prefix: entry.pointer_prefix.clone(),
        },
        context: entry.context.clone(),
        metadata: node.metadata.clone(),
    }
}

/// Down-convert a cached snapshot to a graph node so cache hits share the
/// resolution code path with fresh walks.
fn node_from_cached(entry_index: usize, walk_index: usize, snapshot: TokenSnapshot) -> GraphNode {
    let reference = snapshot
        .token
        .raw
        .get("$ref")
        .and_then(Value::as_str)
        .map(TokenPointer::new);
    let value = if reference.is_some() {
        None
    } else {
        Some(snapshot.token.raw.clone())
    };
    GraphNode {
        entry_index,
        walk_index,
        pointer: snapshot.pointer,
        source_pointer: snapshot.source_pointer,
        token_type: Some(snapshot.token.token_type),
        value,
        reference,
        metadata: snapshot.metadata,
    }
}

fn fatal_diagnostic(err: &DtifxError) -> DiagnosticEvent {
    let (code, message) = match err {
        DtifxError::AliasCycle { .. } => ("DTIF4010", err.to_string()),
        DtifxError::MissingAliasTarget { .. } => ("DTIF4020", err.to_string()),
        other => ("DTIF4000", other.to_string()),
    };
    DiagnosticEvent::new(
        Severity::Error,
        "resolver",
        code,
        DiagnosticCategory::TokenSourceSession,
        message,
    )
}
