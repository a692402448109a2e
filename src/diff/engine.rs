//! The diff algorithm: partition, modification detection, rename pairing,
//! impact classification, summary and bump recommendation.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    diff::{
        AddedEntry, ChangedEntry, ChangedField, RemovedEntry, RenamedEntry, TokenDiff,
        recommend_version_bump,
        strategies::DiffOptions,
    },
    model::TokenSnapshot,
    pointer::TokenPointer,
};

/// A resolved token set keyed by pointer.
pub type TokenSet = BTreeMap<TokenPointer, TokenSnapshot>;

/// Build a token set from a snapshot list.
pub fn token_set_from(snapshots: impl IntoIterator<Item = TokenSnapshot>) -> TokenSet {
    snapshots
        .into_iter()
        .map(|snapshot| (snapshot.pointer.clone(), snapshot))
        .collect()
}

/// Diff two resolved token sets.
pub fn diff_token_sets(previous: &TokenSet, next: &TokenSet, options: &DiffOptions) -> TokenDiff {
    // 1. Partition by pointer.
    let mut added_pointers: Vec<&TokenPointer> =
        next.keys().filter(|p| !previous.contains_key(*p)).collect();
    let mut removed_pointers: Vec<&TokenPointer> =
        previous.keys().filter(|p| !next.contains_key(*p)).collect();
    let common_pointers: Vec<&TokenPointer> =
        previous.keys().filter(|p| next.contains_key(*p)).collect();
    added_pointers.sort();
    removed_pointers.sort();

    // 2. Modification detection over common pointers.
    let mut changed = Vec::new();
    let mut unchanged = 0usize;
    for pointer in common_pointers {
        let before = &previous[pointer];
        let after = &next[pointer];
        let fields = changed_fields(before, after);
        if fields.is_empty() {
            unchanged += 1;
            continue;
        }
        let impact = options.impact.classify_changed(&fields);
        changed.push(ChangedEntry {
            pointer: pointer.clone(),
            previous: before.clone(),
            next: after.clone(),
            changes: fields,
            impact,
        });
    }

    // 3. Rename pairing: strategies run in order over whatever is still
    //    unpaired; each pointer is claimed at most once.
    let mut renamed = Vec::new();
    let mut claimed_removed: BTreeSet<TokenPointer> = BTreeSet::new();
    let mut claimed_added: BTreeSet<TokenPointer> = BTreeSet::new();
    for strategy in &options.rename_strategies {
        let removed_candidates: Vec<&TokenSnapshot> = removed_pointers
            .iter()
            .filter(|p| !claimed_removed.contains(**p))
            .map(|p| &previous[*p])
            .collect();
        let added_candidates: Vec<&TokenSnapshot> = added_pointers
            .iter()
            .filter(|p| !claimed_added.contains(**p))
            .map(|p| &next[*p])
            .collect();
        for (removed_pointer, added_pointer) in
            strategy.pair(&removed_candidates, &added_candidates)
        {
            if claimed_removed.contains(&removed_pointer) || claimed_added.contains(&added_pointer)
            {
                continue;
            }
            let previous_token = previous[&removed_pointer].clone();
            let next_token = next[&added_pointer].clone();
            let impact = options.impact.classify_renamed(&previous_token, &next_token);
            claimed_removed.insert(removed_pointer.clone());
            claimed_added.insert(added_pointer.clone());
            renamed.push(RenamedEntry {
                previous_pointer: removed_pointer,
                next_pointer: added_pointer,
                previous_token,
                next_token,
                strategy: strategy.name().to_string(),
                impact,
            });
        }
    }

    // 4. Impact classification for the unpaired additions and removals.
    let added: Vec<AddedEntry> = added_pointers
        .iter()
        .filter(|p| !claimed_added.contains(**p))
        .map(|p| {
            let token = next[*p].clone();
            AddedEntry {
                pointer: (*p).clone(),
                impact: options.impact.classify_added(&token),
                token,
            }
        })
        .collect();
    let removed: Vec<RemovedEntry> = removed_pointers
        .iter()
        .filter(|p| !claimed_removed.contains(**p))
        .map(|p| {
            let token = previous[*p].clone();
            RemovedEntry {
                pointer: (*p).clone(),
                impact: options.impact.classify_removed(&token),
                token,
            }
        })
        .collect();

    // 5 & 6. Summary and bump recommendation.
    let summary = options
        .summary
        .summarise(&added, &removed, &changed, &renamed, unchanged);
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

/// Compare the tracked field set, recording every difference in a fixed
/// order.
fn changed_fields(previous: &TokenSnapshot, next: &TokenSnapshot) -> Vec<ChangedField> {
    let mut fields = Vec::new();

    if previous.resolution.value != next.resolution.value {
        fields.push(ChangedField::Value);
    }
    if previous.token.raw != next.token.raw {
        fields.push(ChangedField::Raw);
    }
    let previous_ref = previous.token.raw.get("$ref");
    let next_ref = next.token.raw.get("$ref");
    if previous_ref != next_ref {
        fields.push(ChangedField::Ref);
    }
    if previous.token.token_type != next.token.token_type {
        fields.push(ChangedField::Type);
    }

    let description = |s: &TokenSnapshot| {
        s.metadata
            .as_ref()
            .and_then(|m| m.description.clone())
    };
    if description(previous) != description(next) {
        fields.push(ChangedField::Description);
    }
    let extensions = |s: &TokenSnapshot| {
        s.metadata
            .as_ref()
            .map(|m| m.extensions.clone())
            .unwrap_or_default()
    };
    if extensions(previous) != extensions(next) {
        fields.push(ChangedField::Extensions);
    }
    let deprecated = |s: &TokenSnapshot| s.metadata.as_ref().and_then(|m| m.deprecated.clone());
    if deprecated(previous) != deprecated(next) {
        fields.push(ChangedField::Deprecated);
    }

    if previous.resolution.references != next.resolution.references {
        fields.push(ChangedField::References);
    }
    if previous.resolution.resolution_path != next.resolution.resolution_path {
        fields.push(ChangedField::ResolutionPath);
    }
    if previous.resolution.applied_aliases != next.resolution.applied_aliases {
        fields.push(ChangedField::AppliedAliases);
    }

    fields
}
