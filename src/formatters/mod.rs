//! Formatter registry, plans and artifacts.
//!
//! A formatter consumes resolved tokens plus the transform outputs joined
//! to them and emits artifact files. Plans are constructed once per build
//! from configuration and the registry; the formatter executor drives the
//! plans sequentially.

pub mod android_resources;
pub mod css_variables;
pub mod json_tokens;
pub mod swiftui_constants;

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use serde_json::Value;

use crate::{
    config::{FormatterConfig, FormatterOutputConfig},
    errors::{DtifxError, Result},
    model::{TokenSnapshot, TokenType},
    pointer::TokenPointer,
    transforms::TokenSelector,
};

/// A resolved token joined with its transform outputs, as a formatter sees
/// it.
#[derive(Debug, Clone)]
pub struct FormatterToken {
    pub pointer: TokenPointer,
    pub token_type: TokenType,
    pub value: Value,
    pub snapshot: TokenSnapshot,
    /// Transform id → output, for every transform that produced output for
    /// this pointer.
    pub transforms: BTreeMap<String, Value>,
}

/// A file produced by a formatter, relative to the plan's output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
    pub encoding: String,
    pub metadata: Option<Value>,
}

impl Artifact {
    pub fn utf8(path: impl Into<PathBuf>, contents: impl Into<String>) -> Artifact {
        Artifact {
            path: path.into(),
            contents: contents.into(),
            encoding: "utf-8".to_string(),
            metadata: None,
        }
    }
}

/// A named artifact emitter.
pub trait FormatterDefinition: Send + Sync {
    /// Registry name, e.g. `css.variables`.
    fn name(&self) -> &str;

    fn selector(&self) -> TokenSelector;

    /// Output path used when the configuration does not set one.
    fn default_path(&self) -> PathBuf;

    /// Produce artifacts from the selected tokens.
    fn run(&self, tokens: &[FormatterToken], output: &FormatterOutputConfig)
    -> Result<Vec<Artifact>>;
}

/// Factory turning config options into a formatter instance.
pub type FormatterFactory =
    Arc<dyn Fn(Option<&Value>) -> Result<Arc<dyn FormatterDefinition>> + Send + Sync>;

/// One configured formatter, ready to execute.
#[derive(Clone)]
pub struct FormatterPlan {
    /// Unique id within the build; the configured name with a positional
    /// suffix when the same formatter appears more than once.
    pub id: String,
    pub name: String,
    pub output: FormatterOutputConfig,
    pub definition: Arc<dyn FormatterDefinition>,
}

/// Name → factory registry for formatters.
pub struct FormatterRegistry {
    factories: BTreeMap<String, FormatterFactory>,
}

impl FormatterRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the built-in emitters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        css_variables::register(&mut registry);
        swiftui_constants::register(&mut registry);
        android_resources::register(&mut registry);
        json_tokens::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: FormatterFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(DtifxError::Duplicate {
                kind: "formatter",
                name,
            });
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Build plans from configuration in declaration order.
    pub fn plan(&self, configs: &[FormatterConfig]) -> Result<Vec<FormatterPlan>> {
        let mut plans: Vec<FormatterPlan> = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let factory =
                self.factories
                    .get(&config.name)
                    .ok_or_else(|| DtifxError::UnknownName {
                        kind: "formatter",
                        name: config.name.clone(),
                    })?;
            let definition = factory(config.options.as_ref())?;
            let seen_before = configs[..index].iter().any(|c| c.name == config.name);
            let id = if seen_before {
                format!("{}#{}", config.name, index)
            } else {
                config.name.clone()
            };
            plans.push(FormatterPlan {
                id,
                name: config.name.clone(),
                output: config.output.clone().unwrap_or_default(),
                definition,
            });
        }
        Ok(plans)
    }
}

/// Join one snapshot with the transform outputs recorded for its pointer.
pub fn join_token(
    snapshot: &TokenSnapshot,
    transforms: BTreeMap<String, Value>,
) -> FormatterToken {
    FormatterToken {
        pointer: snapshot.pointer.clone(),
        token_type: snapshot.token.token_type.clone(),
        value: snapshot.resolution.value.clone(),
        snapshot: snapshot.clone(),
        transforms,
    }
}

/// Pointer → kebab-case identifier: `#/color/brand/primary` becomes
/// `color-brand-primary`.
pub(crate) fn kebab_identifier(pointer: &TokenPointer) -> String {
    pointer
        .segments()
        .map(sanitise_segment)
        .collect::<Vec<_>>()
        .join("-")
}

/// Pointer → snake_case identifier for Android resource names.
pub(crate) fn snake_identifier(pointer: &TokenPointer) -> String {
    pointer
        .segments()
        .map(sanitise_segment)
        .collect::<Vec<_>>()
        .join("_")
}

/// Pointer → lowerCamelCase identifier for Swift constants.
pub(crate) fn camel_identifier(pointer: &TokenPointer) -> String {
    let mut out = String::new();
    for (idx, segment) in pointer.segments().enumerate() {
        let clean = sanitise_segment(segment);
        if idx == 0 {
            out.push_str(&clean);
        } else {
            let mut chars = clean.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

fn sanitise_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{FormatterRegistry, camel_identifier, kebab_identifier, snake_identifier};
    use crate::{config::FormatterConfig, pointer::TokenPointer};

    /// Identifier styles derive from pointer segments.
    #[test]
    fn identifier_styles() {
        let pointer = TokenPointer::new("#/color/brand/primary");
        assert_eq!(kebab_identifier(&pointer), "color-brand-primary");
        assert_eq!(snake_identifier(&pointer), "color_brand_primary");
        assert_eq!(camel_identifier(&pointer), "colorBrandPrimary");
    }

    /// Duplicate formatter names get positional ids; the first keeps the
    /// bare name.
    #[test]
    fn duplicate_plan_ids() {
        let registry = FormatterRegistry::with_builtins();
        let plans = registry
            .plan(&[
                FormatterConfig {
                    name: "css.variables".into(),
                    output: None,
                    options: None,
                },
                FormatterConfig {
                    name: "css.variables".into(),
                    output: None,
                    options: None,
                },
            ])
            .unwrap();
        assert_eq!(plans[0].id, "css.variables");
        assert_eq!(plans[1].id, "css.variables#1");
    }

    /// Unknown formatter names fail planning.
    #[test]
    fn unknown_name_fails() {
        let registry = FormatterRegistry::with_builtins();
        let result = registry.plan(&[FormatterConfig {
            name: "nope".into(),
            output: None,
            options: None,
        }]);
        assert!(result.is_err());
    }
}
