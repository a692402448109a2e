//! Pluggable diff strategies: rename pairing, impact classification and
//! summary construction.
//!
//! Strategy modules resolve with the same specifier rules as policy
//! plugins; a host port maps resolved locations to strategy instances, and
//! a loader failure is fatal to the diff run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    diff::{
        AddedEntry, ChangedEntry, ChangedField, DiffSummary, Impact, KindCounts, RemovedEntry,
        RenamedEntry,
    },
    digest::{TokenDigest, canonical_json},
    errors::{DtifxError, Result},
    model::TokenSnapshot,
    policy::registry::{PluginLocation, resolve_plugin_specifier},
    pointer::TokenPointer,
};

/// Pairs removed entries with added entries that represent the same token
/// under a new pointer.
pub trait RenameStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Return `(removedPointer, addedPointer)` pairs. Each pointer may be
    /// claimed at most once; the engine drops any duplicate claims.
    fn pair(
        &self,
        removed: &[&TokenSnapshot],
        added: &[&TokenSnapshot],
    ) -> Vec<(TokenPointer, TokenPointer)>;
}

/// Classifies each diff entry as breaking or non-breaking.
pub trait ImpactStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn classify_added(&self, entry: &TokenSnapshot) -> Impact;
    fn classify_removed(&self, entry: &TokenSnapshot) -> Impact;
    fn classify_changed(&self, changes: &[ChangedField]) -> Impact;
    fn classify_renamed(&self, previous: &TokenSnapshot, next: &TokenSnapshot) -> Impact;
}

/// Builds the summary over the classified entry sets.
pub trait SummaryStrategy: Send + Sync {
    fn name(&self) -> &str;

    #[allow(clippy::too_many_arguments)]
    fn summarise(
        &self,
        added: &[AddedEntry],
        removed: &[RemovedEntry],
        changed: &[ChangedEntry],
        renamed: &[RenamedEntry],
        unchanged: usize,
    ) -> DiffSummary;
}

/// The strategy set one diff run uses.
#[derive(Clone)]
pub struct DiffOptions {
    /// Applied in order; may be empty to disable rename detection.
    pub rename_strategies: Vec<Arc<dyn RenameStrategy>>,
    pub impact: Arc<dyn ImpactStrategy>,
    pub summary: Arc<dyn SummaryStrategy>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            rename_strategies: vec![Arc::new(StructuralRenameStrategy::default())],
            impact: Arc::new(DefaultImpactStrategy),
            summary: Arc::new(DefaultSummaryStrategy),
        }
    }
}

impl DiffOptions {
    /// No rename detection at all.
    pub fn without_renames(mut self) -> Self {
        self.rename_strategies.clear();
        self
    }
}

/// Host port resolving strategy module specifiers into instances.
#[async_trait]
pub trait DiffStrategyLoader: Send + Sync {
    async fn load_rename(&self, location: &PluginLocation) -> Result<Arc<dyn RenameStrategy>>;
    async fn load_impact(&self, location: &PluginLocation) -> Result<Arc<dyn ImpactStrategy>>;
    async fn load_summary(&self, location: &PluginLocation) -> Result<Arc<dyn SummaryStrategy>>;
}

/// Resolve strategy specifiers and load them through the host port.
/// Loader failures are fatal to the diff run.
pub async fn load_strategy_options(
    base: DiffOptions,
    config_directory: &std::path::Path,
    rename_specifiers: &[String],
    impact_specifier: Option<&str>,
    summary_specifier: Option<&str>,
    loader: &dyn DiffStrategyLoader,
) -> Result<DiffOptions> {
    let mut options = base;
    for specifier in rename_specifiers {
        let location = resolve_plugin_specifier(specifier, config_directory)?;
        let strategy = loader
            .load_rename(&location)
            .await
            .map_err(|err| strategy_error(specifier, err))?;
        options.rename_strategies.push(strategy);
    }
    if let Some(specifier) = impact_specifier {
        let location = resolve_plugin_specifier(specifier, config_directory)?;
        options.impact = loader
            .load_impact(&location)
            .await
            .map_err(|err| strategy_error(specifier, err))?;
    }
    if let Some(specifier) = summary_specifier {
        let location = resolve_plugin_specifier(specifier, config_directory)?;
        options.summary = loader
            .load_summary(&location)
            .await
            .map_err(|err| strategy_error(specifier, err))?;
    }
    Ok(options)
}

fn strategy_error(specifier: &str, err: DtifxError) -> DtifxError {
    DtifxError::DiffStrategy {
        strategy: specifier.to_string(),
        message: err.to_string(),
    }
}

/// Default rename pairing: identical resolved value and type, plus a
/// configurable subset of metadata.
#[derive(Debug, Clone)]
pub struct StructuralRenameStrategy {
    /// Include `$extensions` in the equivalence key. On by default, so
    /// tokens that differ only in extensions do not pair.
    pub include_extensions: bool,
    /// Include `description` in the equivalence key.
    pub include_description: bool,
}

impl Default for StructuralRenameStrategy {
    fn default() -> Self {
        Self {
            include_extensions: true,
            include_description: false,
        }
    }
}

impl StructuralRenameStrategy {
    fn equivalence_key(&self, snapshot: &TokenSnapshot) -> TokenDigest {
        let mut sections: Vec<String> = vec![
            canonical_json(&snapshot.resolution.value),
            snapshot.token.token_type.to_string(),
        ];
        if self.include_extensions {
            let extensions = snapshot
                .metadata
                .as_ref()
                .map(|m| serde_json::to_value(&m.extensions).unwrap_or_default())
                .unwrap_or_default();
            sections.push(canonical_json(&extensions));
        }
        if self.include_description {
            sections.push(
                snapshot
                    .metadata
                    .as_ref()
                    .and_then(|m| m.description.clone())
                    .unwrap_or_default(),
            );
        }
        let bytes: Vec<&[u8]> = sections.iter().map(|s| s.as_bytes()).collect();
        TokenDigest::from_sections(&bytes)
    }
}

impl RenameStrategy for StructuralRenameStrategy {
    fn name(&self) -> &str {
        "structural"
    }

    fn pair(
        &self,
        removed: &[&TokenSnapshot],
        added: &[&TokenSnapshot],
    ) -> Vec<(TokenPointer, TokenPointer)> {
        use std::collections::BTreeMap;

        // Key both sides; only unambiguous 1:1 matches pair up.
        let mut removed_by_key: BTreeMap<TokenDigest, Vec<&TokenSnapshot>> = BTreeMap::new();
        for snapshot in removed {
            removed_by_key
                .entry(self.equivalence_key(snapshot))
                .or_default()
                .push(snapshot);
        }
        let mut added_by_key: BTreeMap<TokenDigest, Vec<&TokenSnapshot>> = BTreeMap::new();
        for snapshot in added {
            added_by_key
                .entry(self.equivalence_key(snapshot))
                .or_default()
                .push(snapshot);
        }

        let mut pairs = Vec::new();
        for (key, removed_matches) in &removed_by_key {
            if let Some(added_matches) = added_by_key.get(key)
                && removed_matches.len() == 1
                && added_matches.len() == 1
            {
                pairs.push((
                    removed_matches[0].pointer.clone(),
                    added_matches[0].pointer.clone(),
                ));
            }
        }
        pairs
    }
}

/// Default impact policy: additions are non-breaking; removals and renames
/// break consumers; modifications break when a value-affecting field
/// changed.
pub struct DefaultImpactStrategy;

impl ImpactStrategy for DefaultImpactStrategy {
    fn name(&self) -> &str {
        "default"
    }

    fn classify_added(&self, _entry: &TokenSnapshot) -> Impact {
        Impact::NonBreaking
    }

    fn classify_removed(&self, _entry: &TokenSnapshot) -> Impact {
        Impact::Breaking
    }

    fn classify_changed(&self, changes: &[ChangedField]) -> Impact {
        if changes.iter().any(ChangedField::is_breaking) {
            Impact::Breaking
        } else {
            Impact::NonBreaking
        }
    }

    fn classify_renamed(&self, _previous: &TokenSnapshot, _next: &TokenSnapshot) -> Impact {
        // Consumer pointers change.
        Impact::Breaking
    }
}

/// Default summary: per-kind totals, impact tallies, value/metadata change
/// mix, and per-type / per-group breakdowns keyed by `$type` and the first
/// pointer segment.
pub struct DefaultSummaryStrategy;

impl SummaryStrategy for DefaultSummaryStrategy {
    fn name(&self) -> &str {
        "default"
    }

    fn summarise(
        &self,
        added: &[AddedEntry],
        removed: &[RemovedEntry],
        changed: &[ChangedEntry],
        renamed: &[RenamedEntry],
        unchanged: usize,
    ) -> DiffSummary {
        let mut summary = DiffSummary {
            added: added.len(),
            removed: removed.len(),
            changed: changed.len(),
            renamed: renamed.len(),
            unchanged,
            ..Default::default()
        };

        let mut bump =
            |type_name: String, group: Option<String>, impact: Impact, kind: fn(&mut KindCounts)| {
                match impact {
                    Impact::Breaking => summary.breaking += 1,
                    Impact::NonBreaking => summary.non_breaking += 1,
                }
                kind(summary.by_type.entry(type_name).or_default());
                if let Some(group) = group {
                    kind(summary.by_group.entry(group).or_default());
                }
            };

        for entry in added {
            bump(
                entry.token.token.token_type.to_string(),
                entry.pointer.group().map(str::to_string),
                entry.impact,
                |counts| counts.added += 1,
            );
        }
        for entry in removed {
            bump(
                entry.token.token.token_type.to_string(),
                entry.pointer.group().map(str::to_string),
                entry.impact,
                |counts| counts.removed += 1,
            );
        }
        for entry in changed {
            bump(
                entry.next.token.token_type.to_string(),
                entry.pointer.group().map(str::to_string),
                entry.impact,
                |counts| counts.changed += 1,
            );
        }
        for entry in renamed {
            bump(
                entry.next_token.token.token_type.to_string(),
                entry.next_pointer.group().map(str::to_string),
                entry.impact,
                |counts| counts.renamed += 1,
            );
        }

        for entry in changed {
            if entry.changes.contains(&ChangedField::Value) {
                summary.value_changed += 1;
            } else if entry
                .changes
                .iter()
                .all(|field| !field.is_breaking())
            {
                summary.metadata_changed += 1;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{RenameStrategy, StructuralRenameStrategy};
    use crate::{
        model::TokenMetadata,
        testutil::{sample_snapshot, with_metadata},
    };

    /// Identical value and type pair; differing extensions block the pair
    /// while `include_extensions` is on.
    #[test]
    fn extensions_gate_pairing() {
        let removed = with_metadata(
            sample_snapshot("#/color/primary", json!("#123456")),
            TokenMetadata {
                extensions: [("com.example".to_string(), json!({"v": 1}))]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
        );
        let added = with_metadata(
            sample_snapshot("#/color/flagship", json!("#123456")),
            TokenMetadata {
                extensions: [("com.example".to_string(), json!({"v": 2}))]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
        );

        let strict = StructuralRenameStrategy::default();
        assert!(strict.pair(&[&removed], &[&added]).is_empty());

        let relaxed = StructuralRenameStrategy {
            include_extensions: false,
            ..Default::default()
        };
        let pairs = relaxed.pair(&[&removed], &[&added]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.as_str(), "#/color/primary");
        assert_eq!(pairs[0].1.as_str(), "#/color/flagship");
    }

    /// Ambiguous matches (two candidates with one key) do not pair.
    #[test]
    fn ambiguous_matches_do_not_pair() {
        let removed = sample_snapshot("#/color/old", json!("#123456"));
        let added_a = sample_snapshot("#/color/a", json!("#123456"));
        let added_b = sample_snapshot("#/color/b", json!("#123456"));
        let strategy = StructuralRenameStrategy::default();
        assert!(strategy.pair(&[&removed], &[&added_a, &added_b]).is_empty());
    }

    /// Different values never pair.
    #[test]
    fn different_values_do_not_pair() {
        let removed = sample_snapshot("#/color/old", json!("#111111"));
        let added = sample_snapshot("#/color/new", json!("#222222"));
        let strategy = StructuralRenameStrategy::default();
        assert!(strategy.pair(&[&removed], &[&added]).is_empty());
    }
}
