//! JSON snapshot dump formatter, mainly for debugging and downstream
//! tooling that wants the resolved token set verbatim.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    config::FormatterOutputConfig,
    errors::Result,
    formatters::{Artifact, FormatterDefinition, FormatterRegistry, FormatterToken},
    transforms::{TokenSelector, validate_option_keys},
};

pub fn register(registry: &mut FormatterRegistry) {
    registry
        .register(
            "json.tokens",
            Arc::new(|options| {
                validate_option_keys("json.tokens", options, &["pretty"])?;
                let pretty = options
                    .and_then(|o| o.get("pretty"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                Ok(Arc::new(JsonTokens { pretty }) as Arc<dyn FormatterDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
}

struct JsonTokens {
    pretty: bool,
}

impl FormatterDefinition for JsonTokens {
    fn name(&self) -> &str {
        "json.tokens"
    }

    fn selector(&self) -> TokenSelector {
        TokenSelector::any()
    }

    fn default_path(&self) -> std::path::PathBuf {
        "tokens.json".into()
    }

    fn run(
        &self,
        tokens: &[FormatterToken],
        output: &FormatterOutputConfig,
    ) -> Result<Vec<Artifact>> {
        let snapshots: Vec<&crate::model::TokenSnapshot> =
            tokens.iter().map(|t| &t.snapshot).collect();
        let contents = if self.pretty {
            serde_json::to_string_pretty(&snapshots)?
        } else {
            serde_json::to_string(&snapshots)?
        };
        let path = output.path.clone().unwrap_or_else(|| self.default_path());
        Ok(vec![Artifact {
            path,
            contents: contents + "\n",
            encoding: output.encoding.clone().unwrap_or_else(|| "utf-8".into()),
            metadata: None,
        }])
    }
}
