//! DTIF document parsing.
//!
//! A DTIF document is a JSON tree of groups and tokens. A node carrying
//! `$value` or `$ref` is a token; any other object is a group. Groups may
//! set `$type`, which nested tokens inherit. Parsing validates structure
//! first (collecting every issue instead of stopping at the first) and then
//! walks the tree into a flat, document-ordered token list.

pub mod schema;

use serde_json::Value;

use crate::{
    digest::TokenDigest,
    document::schema::{ValidationIssue, validate_document},
    model::{Deprecation, TokenMetadata, TokenType},
    pointer::TokenPointer,
};

/// A parsed and validated DTIF document.
#[derive(Debug, Clone)]
pub struct DtifDocument {
    pub uri: String,
    pub version: Option<String>,
    pub content_hash: TokenDigest,
    root: Value,
}

/// A token as it appears in the source document, before alias resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawToken {
    /// Pointer local to the source document.
    pub pointer: TokenPointer,
    /// Explicit or group-inherited `$type`; absent for bare aliases.
    pub token_type: Option<TokenType>,
    /// Literal value, when the token is not an alias.
    pub value: Option<Value>,
    /// Alias target, when the token is a `$ref`.
    pub reference: Option<TokenPointer>,
    pub metadata: Option<TokenMetadata>,
    /// The raw node as written, used for the snapshot's pre-alias form.
    pub raw: Value,
}

impl DtifDocument {
    /// Parse bytes into a document, aggregating all validation issues.
    pub fn from_bytes(uri: impl Into<String>, bytes: &[u8]) -> Result<Self, Vec<ValidationIssue>> {
        let uri = uri.into();
        let root: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(err) => {
                return Err(vec![ValidationIssue::new(
                    "json",
                    format!("Invalid JSON: {err}"),
                    None,
                )]);
            }
        };
        let content_hash = TokenDigest::new(bytes);
        Self::from_parts(uri, root, content_hash)
    }

    /// Wrap an already-parsed value (virtual sources).
    pub fn from_value(uri: impl Into<String>, root: Value) -> Result<Self, Vec<ValidationIssue>> {
        let content_hash = TokenDigest::of_value(&root);
        Self::from_parts(uri.into(), root, content_hash)
    }

    fn from_parts(
        uri: String,
        root: Value,
        content_hash: TokenDigest,
    ) -> Result<Self, Vec<ValidationIssue>> {
        let issues = validate_document(&root);
        if !issues.is_empty() {
            return Err(issues);
        }
        let version = root
            .get("$version")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            uri,
            version,
            content_hash,
            root,
        })
    }

    /// Flat token list in document order.
    pub fn tokens(&self) -> Vec<RawToken> {
        let mut tokens = Vec::new();
        if let Value::Object(map) = &self.root {
            for (key, value) in map {
                if key.starts_with('$') {
                    continue;
                }
                walk_node(value, vec![key.clone()], None, &mut tokens);
            }
        }
        tokens
    }

    /// Look up the raw node at a source-local pointer.
    pub fn node_at(&self, pointer: &TokenPointer) -> Option<&Value> {
        let mut current = &self.root;
        for segment in pointer.segments() {
            current = current.get(segment)?;
        }
        Some(current)
    }
}

fn walk_node(
    node: &Value,
    path: Vec<String>,
    inherited_type: Option<TokenType>,
    out: &mut Vec<RawToken>,
) {
    let Value::Object(map) = node else {
        return;
    };

    let own_type = map
        .get("$type")
        .and_then(Value::as_str)
        .map(TokenType::new)
        .or(inherited_type);

    if map.contains_key("$value") || map.contains_key("$ref") {
        out.push(RawToken {
            pointer: TokenPointer::from_segments(&path),
            token_type: own_type,
            value: map.get("$value").cloned(),
            reference: map
                .get("$ref")
                .and_then(Value::as_str)
                .map(TokenPointer::new),
            metadata: extract_metadata(map),
            raw: node.clone(),
        });
        return;
    }

    for (key, value) in map {
        if key.starts_with('$') {
            continue;
        }
        let mut child_path = path.clone();
        child_path.push(key.clone());
        walk_node(value, child_path, own_type.clone(), out);
    }
}

fn extract_metadata(map: &serde_json::Map<String, Value>) -> Option<TokenMetadata> {
    let metadata = TokenMetadata {
        description: map
            .get("$description")
            .and_then(Value::as_str)
            .map(str::to_string),
        tags: map
            .get("$tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        author: map
            .get("$author")
            .and_then(Value::as_str)
            .map(str::to_string),
        last_modified: map
            .get("$lastModified")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok()),
        usage_count: map.get("$usageCount").and_then(Value::as_u64),
        deprecated: map.get("$deprecated").and_then(parse_deprecation),
        hash: map.get("$hash").and_then(Value::as_str).map(str::to_string),
        extensions: map
            .get("$extensions")
            .and_then(Value::as_object)
            .map(|ext| ext.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default(),
    };
    if metadata.is_empty() { None } else { Some(metadata) }
}

fn parse_deprecation(value: &Value) -> Option<Deprecation> {
    match value {
        Value::Bool(true) => Some(Deprecation::default()),
        Value::Bool(false) => None,
        Value::Object(map) => Some(Deprecation {
            superseded_by: map
                .get("supersededBy")
                .and_then(Value::as_str)
                .map(TokenPointer::new),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::DtifDocument;
    use crate::pointer::TokenPointer;

    fn sample() -> DtifDocument {
        DtifDocument::from_value(
            "file:///tokens/core.json",
            json!({
                "$version": "1.0.0",
                "color": {
                    "$type": "color",
                    "primary": {"$value": "#102030", "$description": "Brand primary"},
                    "accent": {"$ref": "#/color/primary"}
                },
                "size": {
                    "medium": {"$type": "dimension", "$value": "16px"}
                }
            }),
        )
        .unwrap()
    }

    /// The walker flattens groups and inherits `$type` downward.
    #[test]
    fn walks_tokens_with_inherited_types() {
        let document = sample();
        let tokens = document.tokens();
        assert_eq!(tokens.len(), 3);

        let primary = tokens
            .iter()
            .find(|t| t.pointer == TokenPointer::new("#/color/primary"))
            .unwrap();
        assert_eq!(primary.token_type.as_ref().unwrap().as_str(), "color");
        assert_eq!(primary.value, Some(json!("#102030")));
        assert_eq!(
            primary.metadata.as_ref().unwrap().description.as_deref(),
            Some("Brand primary")
        );

        let accent = tokens
            .iter()
            .find(|t| t.pointer == TokenPointer::new("#/color/accent"))
            .unwrap();
        assert_eq!(accent.reference, Some(TokenPointer::new("#/color/primary")));
        assert!(accent.value.is_none());
    }

    /// Version and content hash are captured at parse time.
    #[test]
    fn captures_version_and_hash() {
        let document = sample();
        assert_eq!(document.version.as_deref(), Some("1.0.0"));
        let again = sample();
        assert_eq!(document.content_hash, again.content_hash);
    }

    /// Invalid JSON aggregates into a single `json` issue.
    #[test]
    fn invalid_json_is_an_issue() {
        let issues = DtifDocument::from_bytes("file:///broken.json", b"{not json").unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].keyword, "json");
    }

    /// node_at follows pointer segments into the raw tree.
    #[test]
    fn node_lookup() {
        let document = sample();
        let node = document
            .node_at(&TokenPointer::new("#/color/primary"))
            .unwrap();
        assert_eq!(node["$value"], "#102030");
        assert!(document.node_at(&TokenPointer::new("#/missing")).is_none());
    }
}
