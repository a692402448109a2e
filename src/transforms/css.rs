//! CSS transforms: colour and dimension values for stylesheet output.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::{
    color::parse_color,
    errors::{DtifxError, Result},
    model::{TokenSnapshot, TokenType},
    transforms::{TokenSelector, TransformDefinition, TransformRegistry, validate_option_keys},
};

/// Register the CSS built-ins.
pub fn register(registry: &mut TransformRegistry) {
    registry
        .register(
            "css.color",
            Arc::new(|options| {
                validate_option_keys("css.color", options, &["format"])?;
                let format = options
                    .and_then(|o| o.get("format"))
                    .and_then(Value::as_str)
                    .unwrap_or("hex")
                    .to_string();
                if format != "hex" && format != "rgb" {
                    return Err(DtifxError::InvalidOption {
                        owner: "css.color".into(),
                        message: format!("unsupported format `{format}`"),
                    });
                }
                Ok(Arc::new(CssColor { format }) as Arc<dyn TransformDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
    registry
        .register(
            "css.dimension",
            Arc::new(|options| {
                validate_option_keys("css.dimension", options, &[])?;
                Ok(Arc::new(CssDimension) as Arc<dyn TransformDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
}

struct CssColor {
    format: String,
}

impl TransformDefinition for CssColor {
    fn name(&self) -> &str {
        "css.color"
    }

    fn group(&self) -> &str {
        "css"
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
        let rendered = match self.format.as_str() {
            "rgb" => format!(
                "rgb({}, {}, {})",
                (color.r * 255.0).round() as u8,
                (color.g * 255.0).round() as u8,
                (color.b * 255.0).round() as u8
            ),
            _ => color.to_hex(),
        };
        Ok(json!({"value": rendered}))
    }
}

struct CssDimension;

impl TransformDefinition for CssDimension {
    fn name(&self) -> &str {
        "css.dimension"
    }

    fn group(&self) -> &str {
        "css"
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
        Ok(json!({"value": rendered}))
    }
}

/// Accepts `"16px"` strings and `{value, unit}` objects.
pub(crate) fn render_dimension(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => {
            let magnitude = map.get("value").and_then(Value::as_f64)?;
            let unit = map.get("unit").and_then(Value::as_str).unwrap_or("px");
            if magnitude.fract() == 0.0 {
                Some(format!("{}{unit}", magnitude as i64))
            } else {
                Some(format!("{magnitude}{unit}"))
            }
        }
        Value::Number(n) => Some(format!("{n}px")),
        _ => None,
    }
}
