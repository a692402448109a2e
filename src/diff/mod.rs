//! Token diff engine: classifies the delta between two resolved token sets
//! and derives a semver bump recommendation.

pub mod engine;
pub mod filter;
pub mod report;
pub mod strategies;

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{model::TokenSnapshot, pointer::TokenPointer};

pub use engine::{TokenSet, diff_token_sets, token_set_from};
pub use filter::{DiffFilters, filter_token_diff};
pub use strategies::{DiffOptions, ImpactStrategy, RenameStrategy, StructuralRenameStrategy};

/// Fields compared for modification detection, recorded verbatim in the
/// order they were detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangedField {
    Value,
    Raw,
    Ref,
    Type,
    Description,
    Extensions,
    Deprecated,
    References,
    ResolutionPath,
    AppliedAliases,
}

impl ChangedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangedField::Value => "value",
            ChangedField::Raw => "raw",
            ChangedField::Ref => "ref",
            ChangedField::Type => "type",
            ChangedField::Description => "description",
            ChangedField::Extensions => "extensions",
            ChangedField::Deprecated => "deprecated",
            ChangedField::References => "references",
            ChangedField::ResolutionPath => "resolutionPath",
            ChangedField::AppliedAliases => "appliedAliases",
        }
    }

    /// Whether a change in this field breaks consumers by default.
    pub fn is_breaking(&self) -> bool {
        matches!(
            self,
            ChangedField::Value
                | ChangedField::Raw
                | ChangedField::Ref
                | ChangedField::Type
                | ChangedField::Deprecated
                | ChangedField::ResolutionPath
        )
    }
}

/// Breaking vs non-breaking classification of one diff entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Impact {
    Breaking,
    NonBreaking,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Breaking => f.write_str("breaking"),
            Impact::NonBreaking => f.write_str("non-breaking"),
        }
    }
}

/// Kinds of diff entries, used by filters and report payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
    Renamed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddedEntry {
    pub pointer: TokenPointer,
    pub token: TokenSnapshot,
    pub impact: Impact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemovedEntry {
    pub pointer: TokenPointer,
    pub token: TokenSnapshot,
    pub impact: Impact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangedEntry {
    pub pointer: TokenPointer,
    pub previous: TokenSnapshot,
    pub next: TokenSnapshot,
    /// The modified fields, recorded verbatim.
    pub changes: Vec<ChangedField>,
    pub impact: Impact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenamedEntry {
    #[serde(rename = "previousId")]
    pub previous_pointer: TokenPointer,
    #[serde(rename = "nextId")]
    pub next_pointer: TokenPointer,
    pub previous_token: TokenSnapshot,
    pub next_token: TokenSnapshot,
    /// The rename strategy that paired the two entries.
    pub strategy: String,
    pub impact: Impact,
}

/// Per-kind counters used in the per-type and per-group breakdowns.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KindCounts {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub renamed: usize,
}

impl KindCounts {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.changed + self.renamed
    }
}

/// Aggregate counts over one diff.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub renamed: usize,
    pub breaking: usize,
    pub non_breaking: usize,
    pub value_changed: usize,
    pub metadata_changed: usize,
    pub unchanged: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_type: BTreeMap<String, KindCounts>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_group: BTreeMap<String, KindCounts>,
}

/// Semver recommendation derived from a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionBump {
    Major,
    Minor,
    Patch,
    None,
}

impl fmt::Display for VersionBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VersionBump::Major => "major",
            VersionBump::Minor => "minor",
            VersionBump::Patch => "patch",
            VersionBump::None => "none",
        };
        f.write_str(text)
    }
}

/// The diff engine's output: four disjoint entry sets plus the summary and
/// bump recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenDiff {
    pub added: Vec<AddedEntry>,
    pub removed: Vec<RemovedEntry>,
    pub changed: Vec<ChangedEntry>,
    pub renamed: Vec<RenamedEntry>,
    pub summary: DiffSummary,
    pub recommended_bump: VersionBump,
}

impl TokenDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.renamed.is_empty()
    }
}

/// Bump recommendation from a computed summary.
pub fn recommend_version_bump(summary: &DiffSummary) -> VersionBump {
    if summary.breaking > 0 {
        VersionBump::Major
    } else if summary.added > 0 {
        VersionBump::Minor
    } else if summary.metadata_changed > 0 {
        VersionBump::Patch
    } else {
        VersionBump::None
    }
}
