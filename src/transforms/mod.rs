//! Transform registry and selectors.
//!
//! A transform maps one typed token to a platform-specific output. Concrete
//! transforms are registered by name; configuration selects and
//! parameterises them, and the transformation executor drives the prepared
//! instances against every snapshot.

pub mod android;
pub mod css;
pub mod swiftui;

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;

use crate::{
    digest::TokenDigest,
    errors::{DtifxError, Result},
    model::{TokenSnapshot, TokenType},
    pointer::TokenPointer,
};

/// Type and pointer predicates deciding which snapshots a transform (or
/// formatter) applies to. Empty predicate lists match everything; non-empty
/// lists match disjunctively within themselves and conjunctively across the
/// two categories.
#[derive(Debug, Clone, Default)]
pub struct TokenSelector {
    pub types: Vec<TokenType>,
    pub pointers: Vec<TokenPointer>,
}

impl TokenSelector {
    pub fn any() -> TokenSelector {
        TokenSelector::default()
    }

    pub fn for_type(token_type: TokenType) -> TokenSelector {
        TokenSelector {
            types: vec![token_type],
            pointers: Vec::new(),
        }
    }

    pub fn matches(&self, snapshot: &TokenSnapshot) -> bool {
        let type_ok = self.types.is_empty() || self.types.contains(&snapshot.token.token_type);
        let pointer_ok = self.pointers.is_empty()
            || self
                .pointers
                .iter()
                .any(|prefix| snapshot.pointer.starts_with(prefix));
        type_ok && pointer_ok
    }
}

/// A named transform over single tokens.
pub trait TransformDefinition: Send + Sync {
    /// Registry name, e.g. `css.color`.
    fn name(&self) -> &str;

    /// Output ecosystem group, e.g. `css`.
    fn group(&self) -> &str;

    fn selector(&self) -> TokenSelector;

    /// Compute the platform output for a matching snapshot.
    fn apply(&self, snapshot: &TokenSnapshot) -> Result<Value>;
}

/// Factory turning a config options value into a transform instance.
pub type TransformFactory =
    Arc<dyn Fn(Option<&Value>) -> Result<Arc<dyn TransformDefinition>> + Send + Sync>;

/// A transform selected by configuration, ready to execute.
#[derive(Clone)]
pub struct PreparedTransform {
    /// The configured name; doubles as the cache key component.
    pub id: String,
    pub options_hash: TokenDigest,
    pub definition: Arc<dyn TransformDefinition>,
}

/// Name → factory registry. Populated before a run; read-only during it.
pub struct TransformRegistry {
    factories: BTreeMap<String, TransformFactory>,
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the built-in platform transforms.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        css::register(&mut registry);
        swiftui::register(&mut registry);
        android::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: TransformFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(DtifxError::Duplicate {
                kind: "transform",
                name,
            });
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the transforms a configuration selects, in declaration
    /// order.
    pub fn prepare(
        &self,
        entries: &[crate::config::NamedEntryConfig],
    ) -> Result<Vec<PreparedTransform>> {
        let mut prepared = Vec::with_capacity(entries.len());
        for entry in entries {
            let factory = self
                .factories
                .get(&entry.name)
                .ok_or_else(|| DtifxError::UnknownName {
                    kind: "transform",
                    name: entry.name.clone(),
                })?;
            let definition = factory(entry.options.as_ref())?;
            prepared.push(PreparedTransform {
                id: entry.name.clone(),
                options_hash: options_hash(entry.options.as_ref()),
                definition,
            });
        }
        Ok(prepared)
    }
}

/// Digest of the canonicalised options value; `null` when absent.
pub fn options_hash(options: Option<&Value>) -> TokenDigest {
    match options {
        Some(value) => TokenDigest::of_value(value),
        None => TokenDigest::of_value(&Value::Null),
    }
}

/// Reject option keys outside a definition's declared schema.
pub(crate) fn validate_option_keys(
    owner: &str,
    options: Option<&Value>,
    allowed: &[&str],
) -> Result<()> {
    let Some(options) = options else {
        return Ok(());
    };
    let Value::Object(map) = options else {
        return Err(DtifxError::InvalidOption {
            owner: owner.to_string(),
            message: "options must be an object".to_string(),
        });
    };
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(DtifxError::UnknownOption {
                owner: owner.to_string(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{TokenSelector, TransformRegistry, options_hash, validate_option_keys};
    use crate::{
        config::NamedEntryConfig,
        model::TokenType,
        pointer::TokenPointer,
        testutil::sample_snapshot,
    };

    /// Empty selectors match everything; predicates narrow.
    #[test]
    fn selector_matching() {
        let snapshot = sample_snapshot("#/color/primary", json!("#123456"));
        assert!(TokenSelector::any().matches(&snapshot));
        assert!(TokenSelector::for_type(TokenType::color()).matches(&snapshot));
        assert!(!TokenSelector::for_type(TokenType::dimension()).matches(&snapshot));

        let by_pointer = TokenSelector {
            types: vec![TokenType::color()],
            pointers: vec![TokenPointer::new("#/color")],
        };
        assert!(by_pointer.matches(&snapshot));
        let wrong_pointer = TokenSelector {
            types: Vec::new(),
            pointers: vec![TokenPointer::new("#/size")],
        };
        assert!(!wrong_pointer.matches(&snapshot));
    }

    /// Unknown transform names fail preparation.
    #[test]
    fn unknown_name_fails() {
        let registry = TransformRegistry::with_builtins();
        let result = registry.prepare(&[NamedEntryConfig {
            name: "nope.color".into(),
            options: None,
        }]);
        assert!(result.is_err());
    }

    /// Built-ins prepare with stable options hashes.
    #[test]
    fn prepares_builtins() {
        let registry = TransformRegistry::with_builtins();
        let prepared = registry
            .prepare(&[
                NamedEntryConfig {
                    name: "css.color".into(),
                    options: None,
                },
                NamedEntryConfig {
                    name: "android.color".into(),
                    options: None,
                },
            ])
            .unwrap();
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[0].id, "css.color");
        assert_eq!(prepared[0].options_hash, options_hash(None));
    }

    /// Option validation rejects unknown keys but accepts absent options.
    #[test]
    fn option_key_validation() {
        assert!(validate_option_keys("t", None, &["a"]).is_ok());
        assert!(validate_option_keys("t", Some(&json!({"a": 1})), &["a"]).is_ok());
        assert!(validate_option_keys("t", Some(&json!({"b": 1})), &["a"]).is_err());
        assert!(validate_option_keys("t", Some(&json!([1])), &["a"]).is_err());
    }
}
