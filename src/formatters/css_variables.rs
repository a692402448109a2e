//! CSS custom-property formatter.

use std::{fmt::Write, sync::Arc};

use serde_json::Value;

use crate::{
    config::FormatterOutputConfig,
    errors::Result,
    formatters::{
        Artifact, FormatterDefinition, FormatterRegistry, FormatterToken, kebab_identifier,
    },
    transforms::{TokenSelector, validate_option_keys},
};

pub fn register(registry: &mut FormatterRegistry) {
    registry
        .register(
            "css.variables",
            Arc::new(|options| {
                validate_option_keys("css.variables", options, &["selector"])?;
                let selector = options
                    .and_then(|o| o.get("selector"))
                    .and_then(Value::as_str)
                    .unwrap_or(":root")
                    .to_string();
                Ok(Arc::new(CssVariables { selector }) as Arc<dyn FormatterDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
}

/// Emits one stylesheet declaring a custom property per token. Tokens with
/// a `css.*` transform output use it; others fall back to the resolved
/// value rendered as text.
struct CssVariables {
    selector: String,
}

impl FormatterDefinition for CssVariables {
    fn name(&self) -> &str {
        "css.variables"
    }

    fn selector(&self) -> TokenSelector {
        TokenSelector::any()
    }

    fn default_path(&self) -> std::path::PathBuf {
        "tokens.css".into()
    }

    fn run(
        &self,
        tokens: &[FormatterToken],
        output: &FormatterOutputConfig,
    ) -> Result<Vec<Artifact>> {
        let mut body = String::new();
        let _ = writeln!(body, "{} {{", self.selector);
        for token in tokens {
            let rendered = token
                .transforms
                .iter()
                .find(|(id, _)| id.starts_with("css."))
                .and_then(|(_, out)| out.get("value").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| render_plain(&token.value));
            let _ = writeln!(body, "  --{}: {};", kebab_identifier(&token.pointer), rendered);
        }
        body.push_str("}\n");

        let path = output
            .path
            .clone()
            .unwrap_or_else(|| self.default_path());
        Ok(vec![Artifact {
            path,
            contents: body,
            encoding: output.encoding.clone().unwrap_or_else(|| "utf-8".into()),
            metadata: None,
        }])
    }
}

fn render_plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
