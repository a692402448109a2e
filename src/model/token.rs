//! Token value core: the `$type` tag and the typed value triple.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A DTIF `$type` tag.
///
/// The DTIF type vocabulary is open, so this is a string-backed value type
/// with constructors for the types the built-in transforms understand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenType(String);

impl TokenType {
    pub fn new(name: impl Into<String>) -> TokenType {
        TokenType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn color() -> TokenType {
        TokenType::new("color")
    }

    pub fn dimension() -> TokenType {
        TokenType::new("dimension")
    }

    pub fn duration() -> TokenType {
        TokenType::new("duration")
    }

    pub fn font_family() -> TokenType {
        TokenType::new("fontFamily")
    }

    /// Case-insensitive comparison used by diff filters.
    pub fn matches_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenType {
    fn from(value: &str) -> Self {
        TokenType::new(value)
    }
}

/// The `{type, value, raw}` triple carried by every snapshot.
///
/// `raw` is the pre-alias document value; for an alias token it still holds
/// the `$ref` form while `value` holds the fully resolved result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub value: serde_json::Value,
    pub raw: serde_json::Value,
}

impl Token {
    /// Whether the raw form is an alias reference.
    pub fn is_alias(&self) -> bool {
        self.raw.get("$ref").is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Token, TokenType};

    /// Token types compare case-insensitively for filters only.
    #[test]
    fn type_matching() {
        let ty = TokenType::new("fontFamily");
        assert!(ty.matches_ignore_case("fontfamily"));
        assert_ne!(ty, TokenType::new("fontfamily"));
    }

    /// Alias detection keys off the raw `$ref` form.
    #[test]
    fn alias_detection() {
        let alias = Token {
            token_type: TokenType::color(),
            value: json!("#102030"),
            raw: json!({"$ref": "#/color/base"}),
        };
        let literal = Token {
            token_type: TokenType::color(),
            value: json!("#102030"),
            raw: json!("#102030"),
        };
        assert!(alias.is_alias());
        assert!(!literal.is_alias());
    }

    /// The wire form uses `type`, not `token_type`.
    #[test]
    fn serialises_type_key() {
        let token = Token {
            token_type: TokenType::dimension(),
            value: json!("16px"),
            raw: json!("16px"),
        };
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["type"], "dimension");
    }
}
