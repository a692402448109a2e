//! Optional token metadata: description, tags, deprecation and extensions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pointer::TokenPointer;

/// Metadata attached to a token in the source document.
///
/// Field names follow the DTIF wire format: `$`-prefixed keys for the
/// machine-managed fields, plain keys for authored ones. The `extensions`
/// map is keyed by namespace (`com.example.figma`) and carries free-form
/// objects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(
        rename = "$lastModified",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(
        rename = "$usageCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub usage_count: Option<u64>,
    #[serde(
        rename = "$deprecated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deprecated: Option<Deprecation>,
    #[serde(rename = "$hash", default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(
        rename = "$extensions",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl TokenMetadata {
    /// Whether no field is set at all; such metadata is dropped from
    /// snapshots rather than carried as an empty object.
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.tags.is_empty()
            && self.author.is_none()
            && self.last_modified.is_none()
            && self.usage_count.is_none()
            && self.deprecated.is_none()
            && self.hash.is_none()
            && self.extensions.is_empty()
    }

    /// The metadata fields that participate in the dependency hash:
    /// deprecation, `$hash`, extensions and description. Rendered as a JSON
    /// object so the tracker can canonicalise it.
    pub fn dependency_subset(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(description) = &self.description {
            map.insert("description".into(), serde_json::Value::String(description.clone()));
        }
        if let Some(deprecated) = &self.deprecated {
            map.insert(
                "deprecated".into(),
                serde_json::to_value(deprecated).unwrap_or(serde_json::Value::Null),
            );
        }
        if let Some(hash) = &self.hash {
            map.insert("hash".into(), serde_json::Value::String(hash.clone()));
        }
        if !self.extensions.is_empty() {
            map.insert(
                "extensions".into(),
                serde_json::to_value(&self.extensions).unwrap_or(serde_json::Value::Null),
            );
        }
        serde_json::Value::Object(map)
    }
}

/// Deprecation marker with an optional replacement pointer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deprecation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<TokenPointer>,
}
