//! Token snapshots: the fully resolved representation of a single token,
//! including alias resolution details and provenance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    model::{metadata::TokenMetadata, token::Token},
    pointer::TokenPointer,
};

/// Arena index for snapshots during resolution. Reference lists inside the
/// resolver use ids instead of owned snapshots so the alias graph cannot
/// form ownership cycles.
pub type SnapshotId = u32;

/// The unit of resolved data produced by the resolution session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSnapshot {
    /// Globally unique pointer after prefixing.
    pub pointer: TokenPointer,
    /// Original pointer inside the source document.
    pub source_pointer: TokenPointer,
    pub token: Token,
    pub resolution: ResolutionInfo,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TokenMetadata>,
}

/// How a token's value was produced from the alias graph.
///
/// For a non-alias token `references` is empty, `resolution_path` is just
/// the token itself and `applied_aliases` likewise. For an alias chain
/// `a -> b -> c`, snapshot `a` carries `applied_aliases = [a, b, c]` and the
/// resolved value of `c`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionInfo {
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<TokenPointer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolution_path: Vec<TokenPointer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_aliases: Vec<TokenPointer>,
}

/// Where a snapshot came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub source_id: String,
    pub layer: String,
    pub layer_index: usize,
    pub uri: String,
    pub pointer_prefix: TokenPointer,
}

impl TokenSnapshot {
    /// The resolved value, after all aliases are applied.
    pub fn resolved_value(&self) -> &serde_json::Value {
        &self.resolution.value
    }

    /// Tags from metadata, empty when none are set.
    pub fn tags(&self) -> &[String] {
        self.metadata.as_ref().map(|m| m.tags.as_slice()).unwrap_or(&[])
    }

    /// Whether the token is marked deprecated.
    pub fn is_deprecated(&self) -> bool {
        self.metadata
            .as_ref()
            .is_some_and(|m| m.deprecated.is_some())
    }
}
