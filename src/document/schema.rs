//! Structural validation for DTIF documents.
//!
//! Validation never short-circuits: every issue in a document is collected
//! so the planner can report all failures across all sources in one pass.

use serde_json::Value;

/// A single schema violation, addressable by the failing JSON path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    /// The failing schema keyword, e.g. `type`, `value`, `ref`, `layer`.
    pub keyword: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        keyword: impl Into<String>,
        message: impl Into<String>,
        pointer: Option<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            message: message.into(),
            pointer: pointer.map(Into::into),
        }
    }
}

/// Keywords a token or group node may carry besides plain child names.
const NODE_KEYWORDS: &[&str] = &[
    "$type",
    "$value",
    "$ref",
    "$description",
    "$tags",
    "$author",
    "$lastModified",
    "$usageCount",
    "$deprecated",
    "$hash",
    "$extensions",
];

const ROOT_KEYWORDS: &[&str] = &["$version", "$description"];

/// Validate a full document, returning every issue found.
pub fn validate_document(root: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Value::Object(map) = root else {
        issues.push(ValidationIssue::new(
            "root",
            "Document root must be an object",
            Some("#/".to_string()),
        ));
        return issues;
    };

    if let Some(version) = map.get("$version")
        && !version.is_string()
    {
        issues.push(ValidationIssue::new(
            "version",
            "$version must be a string",
            Some("#/$version".to_string()),
        ));
    }

    for (key, value) in map {
        if key.starts_with('$') {
            if !ROOT_KEYWORDS.contains(&key.as_str()) {
                issues.push(ValidationIssue::new(
                    "unknown",
                    format!("Unknown root keyword `{key}`"),
                    Some(format!("#/{key}")),
                ));
            }
            continue;
        }
        validate_node(value, &format!("#/{key}"), &mut issues);
    }

    issues
}

fn validate_node(node: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Value::Object(map) = node else {
        issues.push(ValidationIssue::new(
            "node",
            "Group and token nodes must be objects",
            Some(path.to_string()),
        ));
        return;
    };

    let has_value = map.contains_key("$value");
    let has_ref = map.contains_key("$ref");

    if has_value && has_ref {
        issues.push(ValidationIssue::new(
            "value",
            "A token cannot carry both $value and $ref",
            Some(path.to_string()),
        ));
    }

    if has_ref {
        match map.get("$ref") {
            Some(Value::String(target)) if target.starts_with("#/") => {}
            _ => issues.push(ValidationIssue::new(
                "ref",
                "$ref must be a document-rooted pointer string",
                Some(format!("{path}/$ref")),
            )),
        }
    }

    if let Some(ty) = map.get("$type")
        && !ty.is_string()
    {
        issues.push(ValidationIssue::new(
            "type",
            "$type must be a string",
            Some(format!("{path}/$type")),
        ));
    }

    if let Some(extensions) = map.get("$extensions")
        && !extensions.is_object()
    {
        issues.push(ValidationIssue::new(
            "extensions",
            "$extensions must be an object keyed by namespace",
            Some(format!("{path}/$extensions")),
        ));
    }

    if has_value || has_ref {
        // Token node: children are not allowed, only keywords.
        for key in map.keys() {
            if !key.starts_with('$') {
                issues.push(ValidationIssue::new(
                    "token",
                    format!("Token node cannot contain child `{key}`"),
                    Some(format!("{path}/{key}")),
                ));
            } else if !NODE_KEYWORDS.contains(&key.as_str()) {
                issues.push(ValidationIssue::new(
                    "unknown",
                    format!("Unknown token keyword `{key}`"),
                    Some(format!("{path}/{key}")),
                ));
            }
        }
        return;
    }

    // Group node: recurse into children.
    for (key, value) in map {
        if key.starts_with('$') {
            if !NODE_KEYWORDS.contains(&key.as_str()) {
                issues.push(ValidationIssue::new(
                    "unknown",
                    format!("Unknown group keyword `{key}`"),
                    Some(format!("{path}/{key}")),
                ));
            }
            continue;
        }
        validate_node(value, &format!("{path}/{key}"), issues);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::validate_document;

    /// A well-formed document validates cleanly.
    #[test]
    fn accepts_valid_document() {
        let issues = validate_document(&json!({
            "$version": "1.0.0",
            "color": {
                "$type": "color",
                "primary": {"$value": "#123456"},
                "accent": {"$ref": "#/color/primary"}
            }
        }));
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    /// All issues are collected, not just the first.
    #[test]
    fn collects_every_issue() {
        let issues = validate_document(&json!({
            "$version": 2,
            "color": {
                "broken": {"$value": "#123456", "$ref": "#/color/primary"},
                "badref": {"$ref": "color/primary"}
            }
        }));
        let keywords: Vec<&str> = issues.iter().map(|i| i.keyword.as_str()).collect();
        assert!(keywords.contains(&"version"));
        assert!(keywords.contains(&"value"));
        assert!(keywords.contains(&"ref"));
        assert_eq!(issues.len(), 3);
    }

    /// Token nodes cannot nest children.
    #[test]
    fn token_children_are_rejected() {
        let issues = validate_document(&json!({
            "size": {"m": {"$value": "16px", "nested": {"$value": "1px"}}}
        }));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].keyword, "token");
        assert_eq!(issues[0].pointer.as_deref(), Some("#/size/m/nested"));
    }

    /// Non-object roots fail with a single root issue.
    #[test]
    fn non_object_root() {
        let issues = validate_document(&json!([1, 2, 3]));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].keyword, "root");
    }
}
