//! SwiftUI constants formatter.

use std::{fmt::Write, sync::Arc};

use serde_json::Value;

use crate::{
    config::FormatterOutputConfig,
    errors::Result,
    formatters::{
        Artifact, FormatterDefinition, FormatterRegistry, FormatterToken, camel_identifier,
    },
    transforms::{TokenSelector, validate_option_keys},
};

pub fn register(registry: &mut FormatterRegistry) {
    registry
        .register(
            "swiftui.constants",
            Arc::new(|options| {
                validate_option_keys("swiftui.constants", options, &["enumName"])?;
                let enum_name = options
                    .and_then(|o| o.get("enumName"))
                    .and_then(Value::as_str)
                    .unwrap_or("DesignTokens")
                    .to_string();
                Ok(Arc::new(SwiftUiConstants { enum_name }) as Arc<dyn FormatterDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
}

/// Emits a Swift enum of static constants. Only tokens with a `swiftui.*`
/// transform output are included; the transform decides the Swift
/// expression.
struct SwiftUiConstants {
    enum_name: String,
}

impl FormatterDefinition for SwiftUiConstants {
    fn name(&self) -> &str {
        "swiftui.constants"
    }

    fn selector(&self) -> TokenSelector {
        TokenSelector::any()
    }

    fn default_path(&self) -> std::path::PathBuf {
        "DesignTokens.swift".into()
    }

    fn run(
        &self,
        tokens: &[FormatterToken],
        output: &FormatterOutputConfig,
    ) -> Result<Vec<Artifact>> {
        let mut body = String::new();
        let _ = writeln!(body, "import SwiftUI");
        let _ = writeln!(body);
        let _ = writeln!(body, "enum {} {{", self.enum_name);
        for token in tokens {
            let Some(expression) = token
                .transforms
                .iter()
                .find(|(id, _)| id.starts_with("swiftui."))
                .and_then(|(_, out)| out.get("value").and_then(Value::as_str))
            else {
                continue;
            };
            let _ = writeln!(
                body,
                "    static let {} = {}",
                camel_identifier(&token.pointer),
                expression
            );
        }
        body.push_str("}\n");

        let path = output.path.clone().unwrap_or_else(|| self.default_path());
        Ok(vec![Artifact {
            path,
            contents: body,
            encoding: output.encoding.clone().unwrap_or_else(|| "utf-8".into()),
            metadata: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::{
        config::{FormatterConfig, FormatterOutputConfig},
        formatters::{FormatterRegistry, join_token},
        testutil::sample_snapshot,
    };

    /// Tokens without a swiftui transform output are skipped.
    #[test]
    fn emits_swift_enum() {
        let registry = FormatterRegistry::with_builtins();
        let plan = registry
            .plan(&[FormatterConfig {
                name: "swiftui.constants".into(),
                output: None,
                options: Some(json!({"enumName": "Tokens"})),
            }])
            .unwrap()
            .remove(0);

        let with_transform = join_token(
            &sample_snapshot("#/color/brand/primary", json!("#ff0000")),
            BTreeMap::from([(
                "swiftui.color".to_string(),
                json!({"value": "Color(red: 1.0000, green: 0.0000, blue: 0.0000, opacity: 1.0000)"}),
            )]),
        );
        let skipped = join_token(
            &sample_snapshot("#/color/accent", json!("#00ff00")),
            BTreeMap::new(),
        );

        let artifacts = plan
            .definition
            .run(&[with_transform, skipped], &FormatterOutputConfig::default())
            .unwrap();
        let swift = &artifacts[0].contents;
        assert!(swift.contains("enum Tokens {"));
        assert!(swift.contains("static let colorBrandPrimary = Color(red: 1.0000"));
        assert!(!swift.contains("colorAccent"));
    }
}
