//! Diff filtering: restrict a diff to types, groups, pointer paths,
//! impacts and change kinds.
//!
//! Filters are disjunctive within one category and conjunctive across
//! categories; the filtered summary is recomputed over the restricted set.

use crate::diff::{
    ChangeKind, Impact, TokenDiff, recommend_version_bump,
    strategies::{DefaultSummaryStrategy, SummaryStrategy},
};

/// Filter values, all optional. Empty lists leave the category open.
#[derive(Debug, Clone, Default)]
pub struct DiffFilters {
    /// Token `$type` values, matched case-insensitively.
    pub types: Vec<String>,
    /// Top-level groups (first pointer segment), matched case-insensitively.
    pub groups: Vec<String>,
    /// Pointer prefixes; leading `#`/`/` are trimmed before matching.
    pub paths: Vec<String>,
    pub impacts: Vec<Impact>,
    pub kinds: Vec<ChangeKind>,
}

impl DiffFilters {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.groups.is_empty()
            && self.paths.is_empty()
            && self.impacts.is_empty()
            && self.kinds.is_empty()
    }

    fn matches(
        &self,
        kind: ChangeKind,
        impact: Impact,
        token_type: &crate::model::TokenType,
        pointer: &crate::pointer::TokenPointer,
    ) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return false;
        }
        if !self.impacts.is_empty() && !self.impacts.contains(&impact) {
            return false;
        }
        if !self.types.is_empty()
            && !self
                .types
                .iter()
                .any(|t| token_type.matches_ignore_case(t))
        {
            return false;
        }
        if !self.groups.is_empty() {
            let group = pointer.group().unwrap_or_default();
            if !self.groups.iter().any(|g| group.eq_ignore_ascii_case(g)) {
                return false;
            }
        }
        if !self.paths.is_empty() {
            let path = pointer.path();
            let hit = self.paths.iter().any(|raw| {
                let trimmed = raw.trim_start_matches('#').trim_start_matches('/');
                path == trimmed
                    || path
                        .strip_prefix(trimmed)
                        .is_some_and(|rest| rest.starts_with('/'))
            });
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Produce a sub-diff restricted by the filters. The summary (and with it
/// the bump recommendation) is recomputed over the restricted entries, so
/// every count is monotonically ≤ the unfiltered diff's.
pub fn filter_token_diff(diff: &TokenDiff, filters: &DiffFilters) -> TokenDiff {
    if filters.is_empty() {
        return diff.clone();
    }

    let added: Vec<_> = diff
        .added
        .iter()
        .filter(|entry| {
            filters.matches(
                ChangeKind::Added,
                entry.impact,
                &entry.token.token.token_type,
                &entry.pointer,
            )
        })
        .cloned()
        .collect();
    let removed: Vec<_> = diff
        .removed
        .iter()
        .filter(|entry| {
            filters.matches(
                ChangeKind::Removed,
                entry.impact,
                &entry.token.token.token_type,
                &entry.pointer,
            )
        })
        .cloned()
        .collect();
    let changed: Vec<_> = diff
        .changed
        .iter()
        .filter(|entry| {
            filters.matches(
                ChangeKind::Changed,
                entry.impact,
                &entry.next.token.token_type,
                &entry.pointer,
            )
        })
        .cloned()
        .collect();
    let renamed: Vec<_> = diff
        .renamed
        .iter()
        .filter(|entry| {
            // A rename matches on either end of the pair.
            filters.matches(
                ChangeKind::Renamed,
                entry.impact,
                &entry.next_token.token.token_type,
                &entry.next_pointer,
            ) || filters.matches(
                ChangeKind::Renamed,
                entry.impact,
                &entry.previous_token.token.token_type,
                &entry.previous_pointer,
            )
        })
        .cloned()
        .collect();

    let summary = DefaultSummaryStrategy.summarise(
        &added,
        &removed,
        &changed,
        &renamed,
        diff.summary.unchanged,
    );
    let recommended_bump = recommend_version_bump(&summary);

    TokenDiff {
        added,
        removed,
        changed,
        renamed,
        summary,
        recommended_bump,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DiffFilters, filter_token_diff};
    use crate::{
        diff::{ChangeKind, Impact, TokenDiff, diff_token_sets, strategies::DiffOptions, token_set_from},
        model::TokenType,
        testutil::{sample_snapshot, snapshot_with_type},
    };

    fn sample_diff() -> TokenDiff {
        let previous = token_set_from([
            sample_snapshot("#/color/primary", json!("#000000")),
            snapshot_with_type("#/size/small", TokenType::dimension(), json!("4px")),
        ]);
        let next = token_set_from([
            sample_snapshot("#/color/primary", json!("#111111")),
            snapshot_with_type("#/size/small", TokenType::dimension(), json!("4px")),
            snapshot_with_type("#/size/medium", TokenType::dimension(), json!("16px")),
        ]);
        diff_token_sets(&previous, &next, &DiffOptions::default())
    }

    /// Type filters match case-insensitively and restrict every set.
    #[test]
    fn filter_by_type() {
        let diff = sample_diff();
        let filtered = filter_token_diff(
            &diff,
            &DiffFilters {
                types: vec!["Dimension".into()],
                ..Default::default()
            },
        );
        assert_eq!(filtered.added.len(), 1);
        assert!(filtered.changed.is_empty());
        assert_eq!(filtered.summary.added, 1);
        assert_eq!(filtered.summary.changed, 0);
    }

    /// Path filters trim leading # and / before prefix matching.
    #[test]
    fn filter_by_path() {
        let diff = sample_diff();
        for path in ["#/color", "/color", "color"] {
            let filtered = filter_token_diff(
                &diff,
                &DiffFilters {
                    paths: vec![path.into()],
                    ..Default::default()
                },
            );
            assert_eq!(filtered.changed.len(), 1, "path form `{path}`");
            assert!(filtered.added.is_empty());
        }
        // Prefixes match whole segments only.
        let filtered = filter_token_diff(
            &diff,
            &DiffFilters {
                paths: vec!["col".into()],
                ..Default::default()
            },
        );
        assert!(filtered.changed.is_empty());
    }

    /// Categories combine conjunctively.
    #[test]
    fn conjunctive_categories() {
        let diff = sample_diff();
        let filtered = filter_token_diff(
            &diff,
            &DiffFilters {
                kinds: vec![ChangeKind::Added],
                impacts: vec![Impact::Breaking],
                ..Default::default()
            },
        );
        // The only addition is non-breaking, so both constraints together
        // exclude everything.
        assert!(filtered.is_empty());
    }

    /// Every filtered count is ≤ its unfiltered counterpart.
    #[test]
    fn filter_monotonicity() {
        let diff = sample_diff();
        let filters = [
            DiffFilters {
                types: vec!["color".into()],
                ..Default::default()
            },
            DiffFilters {
                groups: vec!["size".into()],
                ..Default::default()
            },
            DiffFilters {
                kinds: vec![ChangeKind::Changed],
                ..Default::default()
            },
        ];
        for filter in filters {
            let filtered = filter_token_diff(&diff, &filter);
            assert!(filtered.summary.added <= diff.summary.added);
            assert!(filtered.summary.removed <= diff.summary.removed);
            assert!(filtered.summary.changed <= diff.summary.changed);
            assert!(filtered.summary.renamed <= diff.summary.renamed);
            assert!(filtered.summary.breaking <= diff.summary.breaking);
        }
    }
}
