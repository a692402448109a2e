//! Android resources XML formatter.

use std::{fmt::Write, sync::Arc};

use serde_json::Value;

use crate::{
    config::FormatterOutputConfig,
    errors::Result,
    formatters::{
        Artifact, FormatterDefinition, FormatterRegistry, FormatterToken, snake_identifier,
    },
    model::TokenType,
    transforms::{TokenSelector, validate_option_keys},
};

pub fn register(registry: &mut FormatterRegistry) {
    registry
        .register(
            "android.resources",
            Arc::new(|options| {
                validate_option_keys("android.resources", options, &["prefix"])?;
                let prefix = options
                    .and_then(|o| o.get("prefix"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                Ok(Arc::new(AndroidResources { prefix }) as Arc<dyn FormatterDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
}

/// Emits a `<resources>` document with `<color>` and `<dimen>` entries fed
/// by the `android.*` transforms.
struct AndroidResources {
    prefix: String,
}

impl AndroidResources {
    fn resource_name(&self, token: &FormatterToken) -> String {
        let base = snake_identifier(&token.pointer);
        if self.prefix.is_empty() {
            base
        } else {
            format!("{}_{base}", self.prefix)
        }
    }
}

impl FormatterDefinition for AndroidResources {
    fn name(&self) -> &str {
        "android.resources"
    }

    fn selector(&self) -> TokenSelector {
        TokenSelector {
            types: vec![TokenType::color(), TokenType::dimension()],
            pointers: Vec::new(),
        }
    }

    fn default_path(&self) -> std::path::PathBuf {
        "res/values/design_tokens.xml".into()
    }

    fn run(
        &self,
        tokens: &[FormatterToken],
        output: &FormatterOutputConfig,
    ) -> Result<Vec<Artifact>> {
        let mut body = String::new();
        let _ = writeln!(body, r#"<?xml version="1.0" encoding="utf-8"?>"#);
        let _ = writeln!(body, "<resources>");
        for token in tokens {
            let Some(rendered) = token
                .transforms
                .iter()
                .find(|(id, _)| id.starts_with("android."))
                .and_then(|(_, out)| out.get("value").and_then(Value::as_str))
            else {
                continue;
            };
            let element = if token.token_type == TokenType::color() {
                "color"
            } else {
                "dimen"
            };
            let _ = writeln!(
                body,
                "    <{element} name=\"{}\">{rendered}</{element}>",
                self.resource_name(token)
            );
        }
        body.push_str("</resources>\n");

        let path = output.path.clone().unwrap_or_else(|| self.default_path());
        Ok(vec![Artifact {
            path,
            contents: body,
            encoding: output.encoding.clone().unwrap_or_else(|| "utf-8".into()),
            metadata: None,
        }])
    }
}
