//! Android transforms: ARGB colour resources and dp/sp dimensions.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::{
    color::parse_color,
    errors::{DtifxError, Result},
    model::{TokenSnapshot, TokenType},
    transforms::{
        TokenSelector, TransformDefinition, TransformRegistry, css::render_dimension,
        validate_option_keys,
    },
};

/// Register the Android built-ins.
pub fn register(registry: &mut TransformRegistry) {
    registry
        .register(
            "android.color",
            Arc::new(|options| {
                validate_option_keys("android.color", options, &[])?;
                Ok(Arc::new(AndroidColor) as Arc<dyn TransformDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
    registry
        .register(
            "android.dimension",
            Arc::new(|options| {
                validate_option_keys("android.dimension", options, &["unit"])?;
                let unit = options
                    .and_then(|o| o.get("unit"))
                    .and_then(Value::as_str)
                    .unwrap_or("dp")
                    .to_string();
                if unit != "dp" && unit != "sp" {
                    return Err(DtifxError::InvalidOption {
                        owner: "android.dimension".into(),
                        message: format!("unsupported unit `{unit}`"),
                    });
                }
                Ok(Arc::new(AndroidDimension { unit }) as Arc<dyn TransformDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
}

struct AndroidColor;

impl TransformDefinition for AndroidColor {
    fn name(&self) -> &str {
        "android.color"
    }

    fn group(&self) -> &str {
        "android"
    }

    fn selector(&self) -> TokenSelector {
        TokenSelector::for_type(TokenType::color())
    }

    fn apply(&self, snapshot: &TokenSnapshot) -> Result<Value> {
        let color = parse_color(snapshot.resolved_value()).ok_or_else(|| DtifxError::Transform {
            transform: self.name().into(),
            pointer: snapshot.pointer.to_string(),
            message: format!("not a colour value: {}", snapshot.resolution.value),
        })?;
        Ok(json!({"value": color.to_argb_hex()}))
    }
}

struct AndroidDimension {
    unit: String,
}

impl TransformDefinition for AndroidDimension {
    fn name(&self) -> &str {
        "android.dimension"
    }

    fn group(&self) -> &str {
        "android"
    }

    fn selector(&self) -> TokenSelector {
        TokenSelector::for_type(TokenType::dimension())
    }

    fn apply(&self, snapshot: &TokenSnapshot) -> Result<Value> {
        let rendered = render_dimension(snapshot.resolved_value()).ok_or_else(|| {
            DtifxError::Transform {
                transform: self.name().into(),
                pointer: snapshot.pointer.to_string(),
                message: format!("not a dimension value: {}", snapshot.resolution.value),
            }
        })?;
        // Replace a trailing px unit with the configured Android unit.
        let magnitude = rendered.trim_end_matches(|c: char| c.is_ascii_alphabetic());
        Ok(json!({"value": format!("{magnitude}{}", self.unit)}))
    }
}
